//! Byte-stream transport boundary
//!
//! The engine talks to a TNC through a pair of non-blocking byte streams
//! supplied by the host: a serial port, a Bluetooth socket, a TCP KISS server
//! or an in-memory test double.

use std::io;

/// Incoming byte stream
pub trait ByteSource: Send {
    /// Bytes that can be read without blocking
    fn available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes without blocking
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Outgoing byte stream
pub trait ByteSink: Send {
    /// Write as many bytes as possible without blocking
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// A boxed source/sink pair as handed to the engine
pub type Transport = (Box<dyn ByteSource>, Box<dyn ByteSink>);

/// Map `WouldBlock` to zero bytes
pub(crate) fn non_blocking(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
        other => other,
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn available(&mut self) -> io::Result<usize> {
        (**self).available()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}

impl<S: ByteSink + ?Sized> ByteSink for Box<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}

/// Sink that collects everything written, for tests and capture
impl ByteSink for Vec<u8> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Source over a fixed byte sequence
impl ByteSource for io::Cursor<Vec<u8>> {
    fn available(&mut self) -> io::Result<usize> {
        let len = self.get_ref().len() as u64;
        Ok(len.saturating_sub(self.position()) as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }
}
