//! Relay status snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The on/off state of every channel, read in one status exchange
///
/// Iteration order is ascending channel index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    relays: BTreeMap<u8, bool>,
}

impl StatusSnapshot {
    /// Build a snapshot from `(relay, is_on)` pairs
    pub fn from_states(states: impl IntoIterator<Item = (u8, bool)>) -> Self {
        Self {
            relays: states.into_iter().collect(),
        }
    }

    /// State of one relay, `None` when the channel wasn't reported
    pub fn get(&self, relay: u8) -> Option<bool> {
        self.relays.get(&relay).copied()
    }

    /// Number of channels in the snapshot
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// True when the board reported no channels
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Iterate `(relay, is_on)` in ascending channel order
    pub fn iter(&self) -> impl Iterator<Item = (u8, bool)> + '_ {
        self.relays.iter().map(|(relay, on)| (*relay, *on))
    }

    /// A new snapshot holding only `relay`
    pub fn only(&self, relay: u8) -> Self {
        Self::from_states(self.get(relay).map(|on| (relay, on)))
    }

    /// A new snapshot with `relay` set to `on`
    pub fn with_state(&self, relay: u8, on: bool) -> Self {
        let mut relays = self.relays.clone();
        relays.insert(relay, on);
        Self { relays }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (relay, on) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "CH{}={}", relay, if on { "ON" } else { "OFF" })?;
            first = false;
        }
        Ok(())
    }
}
