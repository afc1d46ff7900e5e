//! Relay session management
//!
//! A [`Session`] owns the transport to one board and serializes every
//! write-then-read exchange behind a single lock, so concurrent callers are
//! queued rather than interleaved.

mod config;
mod error;
mod timer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::protocol::{
    decode_response, encode_status_query, encode_switch, status_frame_len, to_ack,
    to_status_snapshot, Ack, CommandFrame, RelayTarget, StatusSnapshot, MAX_CHANNELS,
    STATUS_LINE_LEN, SWITCH_FRAME_LEN,
};
use crate::transport::{SerialTransport, Transport};

pub use config::{AckMode, SessionConfig};
pub use error::{RelayError, TransportFault};
use timer::Timers;

/// The transport plus everything that may only be touched while holding it
struct Link {
    transport: Option<Box<dyn Transport>>,
    timeout: Duration,
}

impl Link {
    fn transport(&mut self) -> Result<&mut Box<dyn Transport>, RelayError> {
        self.transport.as_mut().ok_or(RelayError::SessionClosed)
    }

    /// Write `frame` after dropping stale input
    fn send(&mut self, frame: &CommandFrame) -> Result<(), RelayError> {
        let transport = self.transport()?;
        transport.clear_input()?;
        debug!(?frame, "tx");
        transport.write_all(frame.as_bytes())?;
        Ok(())
    }

    /// Write `frame` and read exactly `reply_len` bytes back
    fn exchange(&mut self, frame: &CommandFrame, reply_len: usize) -> Result<Vec<u8>, RelayError> {
        self.send(frame)?;
        let timeout = self.timeout;
        let reply = self.transport()?.read_exact_timeout(reply_len, timeout)?;
        debug!(len = reply.len(), "rx");
        Ok(reply)
    }

    /// Query status `reads` times and decode the last reply
    fn query_status(&mut self, channels: u8, reads: u8) -> Result<StatusSnapshot, RelayError> {
        let query = encode_status_query();
        let mut reply = Vec::new();
        for _ in 0..reads.max(1) {
            reply = self.exchange(&query, status_frame_len(channels))?;
        }
        Ok(to_status_snapshot(decode_response(&reply)?)?)
    }

    /// Ask the board how many relays it has by reading status lines until
    /// the board goes quiet
    fn discover(&mut self, reads: u8) -> Result<StatusSnapshot, RelayError> {
        let query = encode_status_query();
        let mut reply = Vec::new();
        for _ in 0..reads.max(1) {
            self.send(&query)?;
            reply.clear();
            let timeout = self.timeout;
            let transport = self.transport()?;
            while reply.len() < status_frame_len(MAX_CHANNELS) {
                match transport.read_exact_timeout(STATUS_LINE_LEN, timeout) {
                    Ok(line) => reply.extend_from_slice(&line),
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut && !reply.is_empty() => {
                        break
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(to_status_snapshot(decode_response(&reply)?)?)
    }

    fn close(&mut self) -> Result<(), RelayError> {
        match self.transport.take() {
            Some(mut transport) => Ok(transport.close()?),
            None => Ok(()),
        }
    }
}

struct Inner {
    config: SessionConfig,
    channels: u8,
    link: Mutex<Link>,
    snapshot: Mutex<Option<StatusSnapshot>>,
    timers: Mutex<Timers>,
    closed: AtomicBool,
}

impl Inner {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), RelayError> {
        if self.is_closed() {
            Err(RelayError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn store(&self, snapshot: StatusSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    fn cached(&self) -> Option<StatusSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Channels `target` addresses on this board, `None` if the board lacks it
    fn board_relays(&self, target: RelayTarget) -> Option<Vec<u8>> {
        match target {
            RelayTarget::One(relay) if !(1..=self.channels).contains(&relay) => {
                debug!(relay, channels = self.channels, "relay not present on board");
                None
            }
            target => Some(target.channels(self.channels)),
        }
    }

    fn cancel_timers(&self, relays: &[u8]) {
        let mut timers = self.timers();
        for relay in relays {
            if timers.cancel(*relay) {
                debug!(relay, "cancelled pending off");
            }
        }
    }

    /// An exchange that overlapped `close()` reports the close, not its own outcome
    fn finish<T>(&self, result: Result<T, RelayError>) -> Result<T, RelayError> {
        self.check_open()?;
        result
    }

    fn status_locked(&self, link: &mut Link) -> Result<StatusSnapshot, RelayError> {
        let snapshot = link.query_status(self.channels, self.config.status_reads);
        let snapshot = self.finish(snapshot)?;
        self.store(snapshot.clone());
        Ok(snapshot)
    }

    /// Switch `relays` and wait for the acknowledgement. Caller holds the link.
    fn switch_locked(&self, link: &mut Link, relays: &[u8], on: bool) -> Result<bool, RelayError> {
        self.check_open()?;
        let mut frames = Vec::with_capacity(relays.len());
        for relay in relays {
            frames.extend(encode_switch(RelayTarget::One(*relay), on, self.channels)?);
        }

        let result = match self.config.ack {
            AckMode::Readback => self.switch_readback(link, &frames, relays, on),
            AckMode::Echo => self.switch_echo(link, &frames),
        };
        self.finish(result)
    }

    fn switch_readback(
        &self,
        link: &mut Link,
        frames: &[CommandFrame],
        relays: &[u8],
        on: bool,
    ) -> Result<bool, RelayError> {
        for frame in frames {
            link.send(frame)?;
        }
        let snapshot = link.query_status(self.channels, self.config.status_reads)?;
        let confirmed = relays.iter().all(|relay| snapshot.get(*relay) == Some(on));
        self.store(snapshot);
        Ok(confirmed)
    }

    fn switch_echo(&self, link: &mut Link, frames: &[CommandFrame]) -> Result<bool, RelayError> {
        let mut confirmed = true;
        for frame in frames {
            let reply = link.exchange(frame, SWITCH_FRAME_LEN)?;
            let ack = to_ack(decode_response(&reply)?)?;
            let expected = Ack {
                relay: frame.relay().unwrap_or_default(),
                on: frame.turns_on().unwrap_or_default(),
            };
            if ack != expected {
                warn!(?ack, ?expected, "board acknowledged a different command");
                confirmed = false;
                continue;
            }
            if let Some(snapshot) = self.cached() {
                self.store(snapshot.with_state(ack.relay, ack.on));
            }
        }
        Ok(confirmed)
    }

    fn fire_deferred_off(&self, relay: u8, id: u64) {
        let mut link = self.link();
        if !self.timers().is_current(relay, id) || self.is_closed() {
            return;
        }
        match self.switch_locked(&mut link, &[relay], false) {
            Ok(true) => debug!(relay, "deferred off done"),
            Ok(false) => warn!(relay, "board did not confirm deferred off"),
            Err(e) => warn!(relay, error = %e, "deferred off failed"),
        }
        self.timers().complete(relay, id);
    }
}

/// An open connection to an LCUS relay board
///
/// All operations block until their exchange completes or times out. The
/// session is `Send + Sync`; share it behind an `Arc` to use it from
/// several threads.
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Open the serial port named in `config` and initialize the board
    pub fn open(config: SessionConfig) -> Result<Self, RelayError> {
        let transport = SerialTransport::open(&config.port_name, config.baud_rate, config.timeout())
            .map_err(|e| RelayError::ConnectionError {
                port: config.port_name.clone(),
                source: e.into(),
            })?;
        Self::with_transport(transport, config)
    }

    /// Initialize a session over an already-open transport
    ///
    /// Discovers the channel count when `config.channels` is `None`, then
    /// switches every relay off when `config.init_off` is set.
    pub fn with_transport(
        transport: impl Transport + 'static,
        config: SessionConfig,
    ) -> Result<Self, RelayError> {
        let mut link = Link {
            transport: Some(Box::new(transport)),
            timeout: config.timeout(),
        };

        let (channels, snapshot) = match config.channels {
            Some(n) if (1..=MAX_CHANNELS).contains(&n) => (n, None),
            Some(n) => {
                let _ = link.close();
                return Err(RelayError::InvalidIndex(n));
            }
            None => match link.discover(config.status_reads) {
                Ok(snapshot) => (snapshot.len() as u8, Some(snapshot)),
                Err(e) => {
                    let _ = link.close();
                    return Err(e);
                }
            },
        };

        info!(port = %config.port_name, channels, "relay session opened");

        let init_off = config.init_off;
        let session = Session {
            inner: Arc::new(Inner {
                config,
                channels,
                link: Mutex::new(link),
                snapshot: Mutex::new(snapshot),
                timers: Mutex::new(Timers::default()),
                closed: AtomicBool::new(false),
            }),
        };

        if init_off {
            session.all_off()?;
        }
        Ok(session)
    }

    /// Number of relays on the board
    pub fn channel_count(&self) -> u8 {
        self.inner.channels
    }

    /// Relay indices on the board, ascending
    pub fn relays(&self) -> Vec<u8> {
        (1..=self.inner.channels).collect()
    }

    /// Change the read timeout used by subsequent exchanges
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.link().timeout = timeout;
    }

    /// Most recent snapshot read from the board, without any I/O
    pub fn last_status(&self) -> Option<StatusSnapshot> {
        self.inner.cached()
    }

    /// Read the state of every relay
    pub fn status(&self) -> Result<StatusSnapshot, RelayError> {
        self.inner.check_open()?;
        let mut link = self.inner.link();
        self.inner.status_locked(&mut link)
    }

    /// Read the state of one relay, as a snapshot holding only that relay
    pub fn status_of(&self, relay: u8) -> Result<StatusSnapshot, RelayError> {
        if !(1..=self.inner.channels).contains(&relay) {
            return Err(RelayError::InvalidIndex(relay));
        }
        Ok(self.status()?.only(relay))
    }

    /// Turn `relay` on. `Ok(false)` when the board lacks the relay or
    /// doesn't confirm the switch.
    pub fn on(&self, relay: u8) -> Result<bool, RelayError> {
        self.switch(RelayTarget::One(relay), true)
    }

    /// Turn `relay` off. `Ok(false)` when the board lacks the relay or
    /// doesn't confirm the switch.
    pub fn off(&self, relay: u8) -> Result<bool, RelayError> {
        self.switch(RelayTarget::One(relay), false)
    }

    /// Turn every relay on; `true` only if all of them confirmed
    pub fn all_on(&self) -> Result<bool, RelayError> {
        self.switch(RelayTarget::All, true)
    }

    /// Turn every relay off; `true` only if all of them confirmed
    pub fn all_off(&self) -> Result<bool, RelayError> {
        self.switch(RelayTarget::All, false)
    }

    /// Switch `target` to `on`, cancelling any deferred off pending for it
    pub fn switch(&self, target: RelayTarget, on: bool) -> Result<bool, RelayError> {
        self.inner.check_open()?;
        let Some(relays) = self.inner.board_relays(target) else {
            return Ok(false);
        };
        let mut link = self.inner.link();
        self.inner.cancel_timers(&relays);
        self.inner.switch_locked(&mut link, &relays, on)
    }

    /// Turn `relay` on and switch it off again after `duration`
    ///
    /// Returns whether the "on" was confirmed. The off runs in the
    /// background and is cancelled by any later command to the same relay
    /// or by closing the session.
    pub fn toggle(&self, relay: u8, duration: Duration) -> Result<bool, RelayError> {
        self.pulse(RelayTarget::One(relay), duration)
    }

    /// [`Session::toggle`] for every relay at once
    pub fn toggle_all(&self, duration: Duration) -> Result<bool, RelayError> {
        self.pulse(RelayTarget::All, duration)
    }

    fn pulse(&self, target: RelayTarget, duration: Duration) -> Result<bool, RelayError> {
        self.inner.check_open()?;
        let Some(relays) = self.inner.board_relays(target) else {
            return Ok(false);
        };

        let mut link = self.inner.link();
        self.inner.cancel_timers(&relays);
        let confirmed = self.inner.switch_locked(&mut link, &relays, true)?;

        let mut timers = self.inner.timers();
        // close() sets the flag before it drains the timers
        self.inner.check_open()?;
        for relay in relays {
            let inner: Weak<Inner> = Arc::downgrade(&self.inner);
            timers.schedule(relay, duration, move |id| {
                if let Some(inner) = inner.upgrade() {
                    inner.fire_deferred_off(relay, id);
                }
            })?;
            debug!(relay, ?duration, "deferred off scheduled");
        }
        Ok(confirmed)
    }

    /// True while a deferred off from `toggle` is pending for `relay`
    pub fn off_pending(&self, relay: u8) -> bool {
        self.inner.timers().is_pending(relay)
    }

    /// Cancel pending deferred offs and release the transport
    ///
    /// Idempotent. Every later operation fails with [`RelayError::SessionClosed`].
    pub fn close(&self) -> Result<(), RelayError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let handles = self.inner.timers().drain();
        let result = self.inner.link().close();
        for handle in handles {
            let _ = handle.join();
        }

        info!(port = %self.inner.config.port_name, "relay session closed");
        result
    }

    /// True once [`Session::close`] has run
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "error closing relay session");
        }
    }
}
