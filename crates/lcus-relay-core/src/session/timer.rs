//! Deferred relay-off timers for `toggle`
//!
//! Each pending off runs on its own thread, parked on a channel with a
//! timeout. Dropping the sender wakes the thread early, which is how a timer
//! is cancelled. A woken timer must still find itself [`Timers::is_current`]
//! under the session's transport lock before it may switch anything, and
//! stays pending until it calls [`Timers::complete`].

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct PendingOff {
    id: u64,
    // Held only to keep the channel open; dropping it cancels the timer.
    _cancel: Sender<()>,
    handle: JoinHandle<()>,
}

/// Pending deferred offs, at most one per relay
#[derive(Default)]
pub(super) struct Timers {
    pending: HashMap<u8, PendingOff>,
    next_id: u64,
}

impl Timers {
    /// Run `fire(id)` on a new thread after `delay` unless cancelled first.
    /// Replaces any timer already pending for `relay`.
    pub(super) fn schedule<F>(&mut self, relay: u8, delay: Duration, fire: F) -> io::Result<()>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel(relay);

        self.next_id += 1;
        let id = self.next_id;
        let (cancel, wait) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(format!("lcus-relay-off-{}", relay))
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = wait.recv_timeout(delay) {
                    fire(id);
                }
            })?;

        self.pending.insert(
            relay,
            PendingOff {
                id,
                _cancel: cancel,
                handle,
            },
        );
        Ok(())
    }

    /// Cancel the timer pending for `relay`, if any
    pub(super) fn cancel(&mut self, relay: u8) -> bool {
        // The thread is detached rather than joined: it may already be
        // waiting for the transport lock our caller holds.
        self.pending.remove(&relay).is_some()
    }

    /// False once the timer was cancelled or replaced
    pub(super) fn is_current(&self, relay: u8, id: u64) -> bool {
        self.pending.get(&relay).is_some_and(|p| p.id == id)
    }

    /// Remove a timer that has done its work
    pub(super) fn complete(&mut self, relay: u8, id: u64) {
        if self.is_current(relay, id) {
            self.pending.remove(&relay);
        }
    }

    pub(super) fn is_pending(&self, relay: u8) -> bool {
        self.pending.contains_key(&relay)
    }

    /// Cancel everything, returning the threads so they can be joined
    /// once no session lock is held
    pub(super) fn drain(&mut self) -> Vec<JoinHandle<()>> {
        self.pending.drain().map(|(_, p)| p.handle).collect()
    }
}
