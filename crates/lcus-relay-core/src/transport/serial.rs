//! Serial port transport
//!
//! LCUS modules enumerate as a CH340 USB serial device (`/dev/ttyUSB*` on
//! Linux, `COM*` on Windows) and talk 9600 8N1 without flow control.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{timed_out, Transport};

/// Poll slice for reads; the overall deadline is enforced in `read_exact_timeout`
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// [`Transport`] over a `serialport` handle
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open and configure `path` for LCUS communication
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, serialport::Error> {
        let mut port = serialport::new(path, baud_rate)
            .timeout(timeout.min(POLL_INTERVAL))
            .open()?;
        configure_port(port.as_mut())?;
        port.clear(serialport::ClearBuffer::All)?;
        debug!(port = path, baud_rate, "serial port opened");
        Ok(Self {
            port: Some(port),
            name: path.to_string(),
        })
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

/// Standard 8N1 framing, no flow control
fn configure_port(port: &mut dyn SerialPort) -> Result<(), serialport::Error> {
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::One)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    Ok(())
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()
    }

    fn read_exact_timeout(&mut self, len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let port = self.port()?;
        let deadline = Instant::now() + timeout;
        let mut response = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out(len, filled));
            }
            port.set_timeout(remaining.min(POLL_INTERVAL))
                .map_err(io::Error::from)?;

            match port.read(&mut response[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial port returned EOF",
                    ))
                }
                Ok(n) => filled += n,
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }

        Ok(response)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.name, "serial port closed");
        }
        Ok(())
    }
}
