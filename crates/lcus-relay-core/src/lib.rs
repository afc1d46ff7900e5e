//! # LCUS Relay Core Library
//!
//! Control for the LCUS series of USB relay modules, which show up as a
//! serial device (tty on Linux/Mac, COM on Windows).

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The LCUS frame codec (switch frames, status query, status/ack replies)
//! - A blocking relay session over any byte-stream transport
//! - A `serialport`-backed transport
//! - A simulated board for tests and demos
//!
//! Relay numbering starts at 1 to match the labels on the hardware.
//!
//! ## Example
//!
//! ```rust,no_run
//! use lcus_relay_core::{Session, SessionConfig};
//! use std::time::Duration;
//!
//! let session = Session::open(SessionConfig::new("/dev/ttyUSB0"))?;
//! session.on(1)?;
//! println!("{}", session.status()?);
//! session.toggle(2, Duration::from_millis(500))?;
//! # Ok::<(), lcus_relay_core::RelayError>(())
//! ```

pub mod demo;
pub mod protocol;
pub mod session;
pub mod transport;

pub use protocol::{RelayTarget, StatusSnapshot};
pub use session::{AckMode, RelayError, Session, SessionConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::SimulatedBoard;
    pub use crate::protocol::{FrameError, RelayTarget, StatusSnapshot};
    pub use crate::session::{AckMode, RelayError, Session, SessionConfig, TransportFault};
    pub use crate::transport::{SerialTransport, Transport};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
