//! LCUS Serial Protocol
//!
//! Implements the fixed-frame command protocol spoken by the LCUS series of
//! USB relay modules (LCUS-1/2/4/8 and their rebrands).
//!
//! Switch commands are 4-byte binary frames, status is requested with a
//! single `0xFF` byte and returned as fixed-width ASCII lines.

mod codec;
mod error;
mod frame;
mod snapshot;

pub use codec::{
    decode_response, encode_off, encode_on, encode_status_query, encode_switch, encode_toggle,
    status_frame_len, to_ack, to_status_snapshot,
};
pub use error::FrameError;
pub use frame::{Ack, CommandFrame, FrameKind, ResponseFrame};
pub use snapshot::StatusSnapshot;

/// Default baud rate for LCUS modules (9600 8N1, no flow control)
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default timeout for responses in milliseconds
/// The LCUS_X2 answers well within 50ms; longer timeouts only slow down channel discovery.
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Largest channel count in the LCUS family (LCUS-8)
pub const MAX_CHANNELS: u8 = 8;

/// First byte of every switch frame
pub const SWITCH_HEADER: u8 = 0xA0;

/// Length of a switch frame (header, relay, op, checksum)
pub const SWITCH_FRAME_LEN: usize = 4;

/// Single-byte status request
pub const STATUS_QUERY: u8 = 0xFF;

/// Width of one `CHn: ON \r\n` / `CHn: OFF\r\n` status line
pub const STATUS_LINE_LEN: usize = 10;

/// Switch opcode: open the contact
pub const OP_OFF: u8 = 0x00;

/// Switch opcode: close the contact
pub const OP_ON: u8 = 0x01;

/// Which relays a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayTarget {
    /// A single 1-based relay channel
    One(u8),
    /// Every channel on the board
    All,
}

impl RelayTarget {
    /// Expand into concrete channel numbers for a board with `channels` relays
    pub fn channels(&self, channels: u8) -> Vec<u8> {
        match self {
            RelayTarget::One(relay) => vec![*relay],
            RelayTarget::All => (1..=channels).collect(),
        }
    }
}

impl From<u8> for RelayTarget {
    fn from(relay: u8) -> Self {
        RelayTarget::One(relay)
    }
}

impl From<Option<u8>> for RelayTarget {
    fn from(relay: Option<u8>) -> Self {
        relay.map_or(RelayTarget::All, RelayTarget::One)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_expansion() {
        assert_eq!(RelayTarget::One(3).channels(4), vec![3]);
        assert_eq!(RelayTarget::All.channels(4), vec![1, 2, 3, 4]);
        assert_eq!(RelayTarget::from(None), RelayTarget::All);
        assert_eq!(RelayTarget::from(Some(2)), RelayTarget::One(2));
    }
}
