//! Byte-stream transports
//!
//! The session only depends on [`Transport`]; the serial implementation lives
//! in [`serial`], and [`crate::demo::SimulatedBoard`] provides an in-process one.

pub mod serial;

use std::io;
use std::time::Duration;

pub use serial::SerialTransport;

/// Abstraction for the half-duplex link to a relay board
pub trait Transport: Send {
    /// Write every byte of `data`
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read exactly `len` bytes, failing with [`io::ErrorKind::TimedOut`]
    /// when they don't all arrive within `timeout`
    fn read_exact_timeout(&mut self, len: usize, timeout: Duration) -> io::Result<Vec<u8>>;

    /// Discard any bytes received but not yet read
    fn clear_input(&mut self) -> io::Result<()>;

    /// Release the underlying device
    fn close(&mut self) -> io::Result<()>;
}

pub(crate) fn timed_out(len: usize, got: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("read {} of {} bytes before timeout", got, len),
    )
}
