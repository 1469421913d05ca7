//! KISS over TCP
//!
//! Software TNCs (Direwolf, soundmodem, ...) expose their KISS port as a TCP
//! server. This module connects to one and splits the stream into the
//! non-blocking source and sink halves the link engine expects.

use simplelink_protocol::transport::{ByteSink, ByteSource};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Peek window used to report available bytes
const PEEK_WINDOW: usize = 4096;

/// TCP transport errors
#[derive(Error, Debug)]
pub enum TcpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not resolve TNC address: {0}")]
    Resolve(String),
}

/// Connected KISS-over-TCP stream
#[derive(Debug)]
pub struct KissTcp {
    stream: TcpStream,
    peer: SocketAddr,
}

impl KissTcp {
    /// Connect to a `host:port` TNC endpoint
    pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self, TcpError> {
        let mut last_err = None;
        let addrs = endpoint
            .to_socket_addrs()
            .map_err(|e| TcpError::Resolve(format!("{}: {}", endpoint, e)))?;

        for addr in addrs {
            match Self::connect_addr(addr, timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| TcpError::Resolve(endpoint.to_string())))
    }

    /// Connect to a resolved address
    pub fn connect_addr(addr: SocketAddr, timeout: Duration) -> Result<Self, TcpError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.connect_timeout(&SockAddr::from(addr), timeout)?;

        // KISS frames are small; send them without coalescing delay
        socket.set_nodelay(true)?;
        socket.set_keepalive(true)?;
        socket.set_nonblocking(true)?;

        info!(%addr, "connected to KISS TNC");
        Ok(KissTcp {
            stream: socket.into(),
            peer: addr,
        })
    }

    /// Wrap an already-connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self, TcpError> {
        let peer = stream.peer_addr()?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(KissTcp { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Split into boxed halves ready for `LinkEngine::attach`
    pub fn split(self) -> Result<(Box<dyn ByteSource>, Box<dyn ByteSink>), TcpError> {
        let reader = TcpSource {
            stream: self.stream.try_clone()?,
            peek: vec![0u8; PEEK_WINDOW],
        };
        let writer = TcpSink {
            stream: self.stream,
        };
        Ok((Box::new(reader), Box::new(writer)))
    }
}

/// Reading half of a [`KissTcp`] connection
pub struct TcpSource {
    stream: TcpStream,
    peek: Vec<u8>,
}

impl ByteSource for TcpSource {
    fn available(&mut self) -> io::Result<usize> {
        match self.stream.peek(&mut self.peek) {
            Ok(0) => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "TNC closed the connection",
            )),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

/// Writing half of a [`KissTcp`] connection
pub struct TcpSink {
    stream: TcpStream,
}

impl ByteSink for TcpSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
}

impl Drop for TcpSink {
    fn drop(&mut self) {
        let _ = self.stream.flush();
        let _ = self.stream.shutdown(Shutdown::Write);
    }
}
