//! Echo loopback transport
//!
//! Everything written to the writer half comes back out of the reader half,
//! the way a TNC with a loopback port behaves. Useful for exercising a single
//! station without a radio.

use parking_lot::Mutex;
use simplelink_protocol::transport::{ByteSink, ByteSource};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Default number of bytes held before writes start to block
pub const DEFAULT_LOOPBACK_CAPACITY: usize = 64 * 1024;

#[derive(Debug)]
struct Shared {
    queue: VecDeque<u8>,
    capacity: usize,
}

/// Echo loopback
#[derive(Debug, Clone)]
pub struct Loopback {
    shared: Arc<Mutex<Shared>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOOPBACK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Loopback {
            shared: Arc::new(Mutex::new(Shared {
                queue: VecDeque::with_capacity(capacity.min(DEFAULT_LOOPBACK_CAPACITY)),
                capacity,
            })),
        }
    }

    /// Split into boxed halves ready for `LinkEngine::attach`
    pub fn split(&self) -> (Box<dyn ByteSource>, Box<dyn ByteSink>) {
        (
            Box::new(LoopbackReader {
                shared: Arc::clone(&self.shared),
            }),
            Box::new(LoopbackWriter {
                shared: Arc::clone(&self.shared),
            }),
        )
    }

    /// Bytes written but not yet read back
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

/// Reading half of a [`Loopback`]
pub struct LoopbackReader {
    shared: Arc<Mutex<Shared>>,
}

impl ByteSource for LoopbackReader {
    fn available(&mut self) -> io::Result<usize> {
        Ok(self.shared.lock().queue.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        let n = buf.len().min(shared.queue.len());
        for (slot, byte) in buf.iter_mut().zip(shared.queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Writing half of a [`Loopback`]
pub struct LoopbackWriter {
    shared: Arc<Mutex<Shared>>,
}

impl ByteSink for LoopbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        let room = shared.capacity - shared.queue.len();
        if room == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let n = buf.len().min(room);
        shared.queue.extend(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo() {
        let loopback = Loopback::new();
        let (mut reader, mut writer) = loopback.split();

        assert_eq!(writer.write(b"hello").unwrap(), 5);
        assert_eq!(reader.available().unwrap(), 5);

        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(loopback.pending(), 2);
    }

    #[test]
    fn test_capacity_blocks() {
        let loopback = Loopback::with_capacity(4);
        let (mut reader, mut writer) = loopback.split();

        assert_eq!(writer.write(b"abcdef").unwrap(), 4);
        let err = writer.write(b"g").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(writer.write(b"g").unwrap(), 1);
    }
}
