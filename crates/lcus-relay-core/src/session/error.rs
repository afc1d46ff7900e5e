//! Session errors

use std::io;
use thiserror::Error;

use crate::protocol::FrameError;

/// Errors returned by [`super::Session`] operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Relay index not valid for this board
    #[error("Invalid relay index: {0}")]
    InvalidIndex(u8),

    /// The serial port couldn't be opened
    #[error("Failed to open {port}: {source}")]
    ConnectionError {
        /// Port name from the config
        port: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Write failure or undecodable reply
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportFault),

    /// The board didn't answer within the read timeout
    #[error("No response from relay board within the timeout")]
    ResponseTimeout,

    /// The session was closed
    #[error("Session closed")]
    SessionClosed,
}

/// Cause of a [`RelayError::TransportError`]
#[derive(Error, Debug)]
pub enum TransportFault {
    /// Port I/O failure other than a timeout
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Reply bytes that don't decode
    #[error("bad reply: {0}")]
    Frame(#[from] FrameError),
}

impl RelayError {
    /// True for errors after which the session can be used again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::TransportError(_) | RelayError::ResponseTimeout
        )
    }
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => RelayError::ResponseTimeout,
            _ => RelayError::TransportError(TransportFault::Io(e)),
        }
    }
}

impl From<FrameError> for RelayError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::InvalidIndex(relay) => RelayError::InvalidIndex(relay),
            other => RelayError::TransportError(TransportFault::Frame(other)),
        }
    }
}
