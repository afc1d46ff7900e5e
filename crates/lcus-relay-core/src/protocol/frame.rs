//! Command and response frames
//!
//! Command frame formats:
//! - Switch: `A0 <relay> <op> <checksum>`, checksum = low byte of the sum of the first three bytes
//! - Status query: `FF`
//!
//! Response frame formats:
//! - Status: one `CH<n>: ON \r\n` or `CH<n>: OFF\r\n` line per channel
//! - Ack: echo of the switch frame (only on firmware that acknowledges commands)

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StatusSnapshot, OP_OFF, OP_ON, STATUS_QUERY, SWITCH_FRAME_LEN, SWITCH_HEADER};

/// Kind of a command or response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    /// Switch one relay on or off
    Switch,
    /// Ask the board for the state of every relay
    StatusQuery,
    /// Status reply
    Status,
    /// Acknowledgement of a switch command
    Ack,
}

/// An outbound command, ready to be written to the transport
#[derive(Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: [u8; SWITCH_FRAME_LEN],
    len: usize,
    kind: FrameKind,
}

impl CommandFrame {
    pub(super) fn switch(relay: u8, on: bool) -> Self {
        let op = if on { OP_ON } else { OP_OFF };
        Self {
            bytes: [SWITCH_HEADER, relay, op, checksum(relay, op)],
            len: SWITCH_FRAME_LEN,
            kind: FrameKind::Switch,
        }
    }

    pub(super) fn status_query() -> Self {
        Self {
            bytes: [STATUS_QUERY, 0, 0, 0],
            len: 1,
            kind: FrameKind::StatusQuery,
        }
    }

    /// Raw bytes to write
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Switch or status query
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Addressed relay for switch frames
    pub fn relay(&self) -> Option<u8> {
        match self.kind {
            FrameKind::Switch => Some(self.bytes[1]),
            _ => None,
        }
    }

    /// Requested state for switch frames
    pub fn turns_on(&self) -> Option<bool> {
        match self.kind {
            FrameKind::Switch => Some(self.bytes[2] == OP_ON),
            _ => None,
        }
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame({:?}, {:02x?})", self.kind, self.as_bytes())
    }
}

/// Acknowledgement of a switch command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Relay the board switched
    pub relay: u8,
    /// State the board switched it to
    pub on: bool,
}

/// A decoded reply from the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFrame {
    /// Full status of every channel
    Status(StatusSnapshot),
    /// Echo of a switch command
    Ack(Ack),
}

impl ResponseFrame {
    /// Status or ack
    pub fn kind(&self) -> FrameKind {
        match self {
            ResponseFrame::Status(_) => FrameKind::Status,
            ResponseFrame::Ack(_) => FrameKind::Ack,
        }
    }
}

pub(super) fn checksum(relay: u8, op: u8) -> u8 {
    SWITCH_HEADER.wrapping_add(relay).wrapping_add(op)
}
