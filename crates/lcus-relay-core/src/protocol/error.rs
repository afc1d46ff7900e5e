//! Frame codec errors

use thiserror::Error;

use super::FrameKind;

/// Errors produced while encoding or decoding LCUS frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Relay index outside `1..=8`
    #[error("Invalid relay index: {0}")]
    InvalidIndex(u8),

    /// Wrong length, markers or checksum
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Switch frame with an opcode other than on/off
    #[error("Unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// A reply decoded fine but isn't the kind the caller asked for
    #[error("Wrong frame kind: expected {expected:?}, got {actual:?}")]
    WrongFrameKind {
        /// Kind the caller wanted
        expected: FrameKind,
        /// Kind that was decoded
        actual: FrameKind,
    },
}
