//! KISS over an RS-232 serial port
//!
//! Hardware TNCs sit on a serial line. The port is opened with a short
//! timeout and only the bytes the driver reports as waiting are read, so
//! neither half ever stalls the tick loop.

use serialport::SerialPort;
use simplelink_protocol::transport::{ByteSink, ByteSource};
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default line rate
pub const DEFAULT_BAUD: u32 = 9600;

/// Read and write timeout on the port
const PORT_TIMEOUT: Duration = Duration::from_millis(1);

/// Serial transport errors
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Unable to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Invalid baud rate: {0}")]
    InvalidBaud(u32),

    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),
}

/// Open serial TNC port
pub struct KissSerial {
    port: Box<dyn SerialPort>,
    path: String,
}

impl KissSerial {
    /// Open `path` at `baud` bits per second, 8N1
    pub fn open(path: &str, baud: u32) -> Result<Self, SerialError> {
        if baud == 0 {
            return Err(SerialError::InvalidBaud(baud));
        }

        let port = serialport::new(path, baud)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|source| SerialError::Open {
                path: path.to_string(),
                source,
            })?;

        info!(path, baud, "opened serial TNC");
        Ok(KissSerial {
            port,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud_rate(&self) -> Result<u32, SerialError> {
        Ok(self.port.baud_rate()?)
    }

    /// Split into boxed halves ready for `LinkEngine::attach`
    pub fn split(self) -> Result<(Box<dyn ByteSource>, Box<dyn ByteSink>), SerialError> {
        let reader = SerialSource {
            port: self.port.try_clone()?,
        };
        let writer = SerialSink { port: self.port };
        Ok((Box::new(reader), Box::new(writer)))
    }
}

/// Reading half of a [`KissSerial`] port
pub struct SerialSource {
    port: Box<dyn SerialPort>,
}

impl ByteSource for SerialSource {
    fn available(&mut self) -> io::Result<usize> {
        let waiting = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(waiting as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        timed_out_as_would_block(self.port.read(buf))
    }
}

/// Writing half of a [`KissSerial`] port
pub struct SerialSink {
    port: Box<dyn SerialPort>,
}

impl ByteSink for SerialSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        timed_out_as_would_block(self.port.write(buf))
    }
}

impl Drop for SerialSink {
    fn drop(&mut self) {
        let _ = self.port.flush();
    }
}

/// Report a port timeout as `WouldBlock`
fn timed_out_as_would_block(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(e) if e.kind() == ErrorKind::TimedOut => Err(ErrorKind::WouldBlock.into()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device() {
        match KissSerial::open("/dev/simplelink-no-such-port", DEFAULT_BAUD) {
            Err(SerialError::Open { path, .. }) => {
                assert_eq!(path, "/dev/simplelink-no-such-port")
            }
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }

    #[test]
    fn test_zero_baud_rejected() {
        assert!(matches!(
            KissSerial::open("/dev/ttyS0", 0),
            Err(SerialError::InvalidBaud(0))
        ));
    }

    #[test]
    fn test_timeout_is_would_block() {
        let timed_out = timed_out_as_would_block(Err(ErrorKind::TimedOut.into()));
        assert_eq!(timed_out.unwrap_err().kind(), ErrorKind::WouldBlock);

        let broken = timed_out_as_would_block(Err(ErrorKind::BrokenPipe.into()));
        assert_eq!(broken.unwrap_err().kind(), ErrorKind::BrokenPipe);

        assert_eq!(timed_out_as_would_block(Ok(5)).unwrap(), 5);
    }
}
