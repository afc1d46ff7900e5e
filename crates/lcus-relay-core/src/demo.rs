//! Demo Mode - Simulated LCUS relay board
//!
//! Behaves like a real LCUS module on the wire: switch frames with a valid
//! checksum change relay state, `0xFF` queues a status reply, and frames for
//! channels the board doesn't have are silently ignored. Used by the test
//! suite and by the CLI's `--demo` mode.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::protocol::{MAX_CHANNELS, OP_OFF, OP_ON, STATUS_QUERY, SWITCH_FRAME_LEN, SWITCH_HEADER};
use crate::transport::{timed_out, Transport};

#[derive(Debug)]
struct BoardState {
    relays: Vec<bool>,
    /// Relay state before the most recent switch command
    previous: Vec<bool>,
    /// Bytes the board has sent but the host hasn't read
    pending: VecDeque<u8>,
    /// When the pending bytes become readable
    ready_at: Instant,
    latency: Duration,
    echo: bool,
    stale_reads: u32,
    corrupt_next: bool,
    fail_next_write: bool,
    written: Vec<u8>,
    closed: bool,
}

/// In-process stand-in for an LCUS relay module
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    /// A board with `channels` relays, all off, answering instantly
    pub fn new(channels: u8) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        Self {
            state: Arc::new(Mutex::new(BoardState {
                relays: vec![false; channels as usize],
                previous: vec![false; channels as usize],
                pending: VecDeque::new(),
                ready_at: Instant::now(),
                latency: Duration::ZERO,
                echo: false,
                stale_reads: 0,
                corrupt_next: false,
                fail_next_write: false,
                written: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Echo every switch frame back, like firmware that acknowledges commands
    pub fn with_echo(self) -> Self {
        self.lock().echo = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of relays on the board
    pub fn channels(&self) -> u8 {
        self.lock().relays.len() as u8
    }

    /// Current state of `relay` as the hardware sees it
    pub fn relay_state(&self, relay: u8) -> Option<bool> {
        let state = self.lock();
        relay
            .checked_sub(1)
            .and_then(|i| state.relays.get(i as usize).copied())
    }

    /// Force a relay, bypassing the protocol
    pub fn set_relay_state(&self, relay: u8, on: bool) {
        let mut state = self.lock();
        if let Some(slot) = relay
            .checked_sub(1)
            .and_then(|i| state.relays.get_mut(i as usize))
        {
            *slot = on;
        }
    }

    /// Delay between a command and its reply becoming readable
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Answer the next `count` status queries with the state from before the
    /// most recent switch command
    pub fn set_stale_reads(&self, count: u32) {
        self.lock().stale_reads = count;
    }

    /// Flip a byte in the next reply
    pub fn corrupt_next_reply(&self) {
        self.lock().corrupt_next = true;
    }

    /// Fail the next write with a broken-pipe error
    pub fn fail_next_write(&self) {
        self.lock().fail_next_write = true;
    }

    /// Every byte the host has written so far
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// True once the host has closed the transport
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl BoardState {
    fn status_reply(&self, relays: &[bool]) -> Vec<u8> {
        relays
            .iter()
            .enumerate()
            .flat_map(|(i, on)| {
                format!("CH{}: {}\r\n", i + 1, if *on { "ON " } else { "OFF" }).into_bytes()
            })
            .collect()
    }

    fn queue_reply(&mut self, mut reply: Vec<u8>) {
        if self.corrupt_next {
            self.corrupt_next = false;
            if let Some(first) = reply.first_mut() {
                *first ^= 0x5A;
            }
        }
        self.pending.extend(reply);
        self.ready_at = Instant::now() + self.latency;
    }

    fn handle(&mut self, data: &[u8]) {
        let mut i = 0;
        while i < data.len() {
            if data[i] == STATUS_QUERY {
                let reply = if self.stale_reads > 0 {
                    self.stale_reads -= 1;
                    self.status_reply(&self.previous)
                } else {
                    self.status_reply(&self.relays)
                };
                self.queue_reply(reply);
                i += 1;
            } else if data[i] == SWITCH_HEADER && i + SWITCH_FRAME_LEN <= data.len() {
                let frame = &data[i..i + SWITCH_FRAME_LEN];
                self.apply_switch(frame);
                i += SWITCH_FRAME_LEN;
            } else {
                i += 1;
            }
        }
    }

    fn apply_switch(&mut self, frame: &[u8]) {
        let (relay, op, sum) = (frame[1], frame[2], frame[3]);
        if SWITCH_HEADER.wrapping_add(relay).wrapping_add(op) != sum {
            return;
        }
        let on = match op {
            OP_ON => true,
            OP_OFF => false,
            _ => return,
        };
        let index = match relay.checked_sub(1) {
            Some(i) if (i as usize) < self.relays.len() => i as usize,
            _ => return,
        };
        self.previous = self.relays.clone();
        self.relays[index] = on;
        if self.echo {
            self.queue_reply(frame.to_vec());
        }
    }
}

impl Transport for SimulatedBoard {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "board closed"));
        }
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        state.written.extend_from_slice(data);
        state.handle(data);
        Ok(())
    }

    fn read_exact_timeout(&mut self, len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let wait = {
            let state = self.lock();
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "board closed"));
            }
            if state.pending.len() < len {
                None
            } else {
                Some(state.ready_at.saturating_duration_since(Instant::now()))
            }
        };

        match wait {
            Some(wait) if wait <= timeout => {
                thread::sleep(wait);
                let mut state = self.lock();
                if state.pending.len() < len {
                    let got = state.pending.len();
                    return Err(timed_out(len, got));
                }
                Ok(state.pending.drain(..len).collect())
            }
            _ => {
                thread::sleep(timeout);
                let got = self.lock().pending.len().min(len);
                Err(timed_out(len, got))
            }
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.lock().pending.clear();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        state.closed = true;
        state.pending.clear();
        Ok(())
    }
}
