//! KISS TNC Framing
//!
//! Frames are delimited by `FEND` and carry a command byte whose low nibble is
//! the KISS command and whose high nibble is the TNC port. `FEND` and `FESC`
//! inside the data are byte-stuffed.
//!
//! ```text
//! FEND | port << 4 | cmd | escaped data ... | FEND
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::trace;

/// Frame delimiter
pub const FEND: u8 = 0xC0;

/// Frame escape
pub const FESC: u8 = 0xDB;

/// Escaped `FEND`
pub const TFEND: u8 = 0xDC;

/// Escaped `FESC`
pub const TFESC: u8 = 0xDD;

/// Data frame to be transmitted by the TNC
pub const CMD_DATA: u8 = 0x00;

/// Keyup delay in 10 ms units
pub const CMD_TX_DELAY: u8 = 0x01;

/// Persistence parameter for CSMA (p = (value + 1) / 256)
pub const CMD_PERSISTENCE: u8 = 0x02;

/// Slot interval in 10 ms units for CSMA
pub const CMD_SLOT_TIME: u8 = 0x03;

/// Time to hold the transmitter after the frame in 10 ms units
pub const CMD_TX_TAIL: u8 = 0x04;

/// 0 selects half duplex, anything else full duplex
pub const CMD_DUPLEX: u8 = 0x05;

/// Leave KISS mode, applies to all ports
pub const CMD_RETURN: u8 = 0xFF;

/// Default size of the streaming decoder buffer
pub const DEFAULT_DECODER_CAPACITY: usize = 8192;

/// KISS framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Invalid escape sequence: FESC followed by 0x{0:02x}")]
    InvalidEscape(u8),

    #[error("Frame ends inside an escape sequence")]
    IncompleteEscape,

    #[error("Receive buffer overflow: partial frame of {discarded} bytes discarded")]
    Overflow { discarded: usize },
}

/// TNC parameter commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KissCommand {
    TxDelay,
    Persistence,
    SlotTime,
    TxTail,
    FullDuplex,
    Return,
}

impl KissCommand {
    /// Command code as carried in the low nibble of the command byte
    pub fn code(self) -> u8 {
        match self {
            KissCommand::TxDelay => CMD_TX_DELAY,
            KissCommand::Persistence => CMD_PERSISTENCE,
            KissCommand::SlotTime => CMD_SLOT_TIME,
            KissCommand::TxTail => CMD_TX_TAIL,
            KissCommand::FullDuplex => CMD_DUPLEX,
            KissCommand::Return => CMD_RETURN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KissCommand::TxDelay => "txdelay",
            KissCommand::Persistence => "persistence",
            KissCommand::SlotTime => "slottime",
            KissCommand::TxTail => "txtail",
            KissCommand::FullDuplex => "duplex",
            KissCommand::Return => "return",
        }
    }
}

impl FromStr for KissCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txdelay" => Ok(KissCommand::TxDelay),
            "persistence" | "p" => Ok(KissCommand::Persistence),
            "slottime" => Ok(KissCommand::SlotTime),
            "txtail" => Ok(KissCommand::TxTail),
            "duplex" | "fullduplex" => Ok(KissCommand::FullDuplex),
            "return" => Ok(KissCommand::Return),
            other => Err(format!("unknown KISS command: {}", other)),
        }
    }
}

impl fmt::Display for KissCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded KISS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissFrame {
    /// TNC port (high nibble of the command byte)
    pub port: u8,
    /// KISS command (low nibble of the command byte)
    pub command: u8,
    /// Unescaped frame contents
    pub data: Bytes,
}

impl KissFrame {
    pub fn is_data(&self) -> bool {
        self.command == CMD_DATA
    }
}

/// Worst-case wire size of a frame carrying `data_len` bytes
pub const fn max_encoded_len(data_len: usize) -> usize {
    // FEND + command + every byte escaped + FEND
    data_len * 2 + 3
}

/// Append byte-stuffed `data` to `dst`
pub fn escape_into(dst: &mut BytesMut, data: &[u8]) {
    dst.reserve(data.len());
    for &byte in data {
        match byte {
            FEND => {
                dst.put_u8(FESC);
                dst.put_u8(TFEND);
            }
            FESC => {
                dst.put_u8(FESC);
                dst.put_u8(TFESC);
            }
            _ => dst.put_u8(byte),
        }
    }
}

/// Reverse byte-stuffing
pub fn unescape(data: &[u8]) -> Result<BytesMut, FramingError> {
    let mut out = BytesMut::with_capacity(data.len());
    let mut bytes = data.iter();

    while let Some(&byte) = bytes.next() {
        if byte != FESC {
            out.put_u8(byte);
            continue;
        }
        match bytes.next() {
            Some(&TFEND) => out.put_u8(FEND),
            Some(&TFESC) => out.put_u8(FESC),
            Some(&other) => return Err(FramingError::InvalidEscape(other)),
            None => return Err(FramingError::IncompleteEscape),
        }
    }

    Ok(out)
}

/// Build a complete data frame for `port`
///
/// # Examples
///
/// ```
/// use simplelink_protocol::kiss::{encode_frame, FEND, FESC, TFEND};
///
/// let frame = encode_frame(&[0x12, FEND], 0);
/// assert_eq!(&frame[..], &[FEND, 0x00, 0x12, FESC, TFEND, FEND]);
/// ```
pub fn encode_frame(data: &[u8], port: u8) -> BytesMut {
    let mut frame = BytesMut::with_capacity(max_encoded_len(data.len()));
    frame.put_u8(FEND);
    frame.put_u8(command_byte(CMD_DATA, port));
    escape_into(&mut frame, data);
    frame.put_u8(FEND);
    frame
}

/// Build a TNC parameter frame
///
/// `Return` is sent without a value and ignores the port.
pub fn encode_command(command: KissCommand, value: u8, port: u8) -> BytesMut {
    let mut frame = BytesMut::with_capacity(4);
    frame.put_u8(FEND);
    match command {
        KissCommand::Return => frame.put_u8(CMD_RETURN),
        _ => {
            frame.put_u8(command_byte(command.code(), port));
            escape_into(&mut frame, &[value]);
        }
    }
    frame.put_u8(FEND);
    frame
}

#[inline]
fn command_byte(command: u8, port: u8) -> u8 {
    ((port & 0x0F) << 4) | (command & 0x0F)
}

/// Streaming KISS decoder over a bounded buffer
///
/// Bytes arrive in arbitrary chunks through [`push`](Self::push); complete
/// frames are extracted one at a time with [`next_frame`](Self::next_frame).
#[derive(Debug)]
pub struct KissDecoder {
    buffer: BytesMut,
    capacity: usize,
}

impl KissDecoder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DECODER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        KissDecoder {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Space left before the buffer is full
    pub fn free_space(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Buffer as many bytes as fit, returning how many were accepted
    pub fn push(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.free_space());
        self.buffer.extend_from_slice(&data[..accepted]);
        accepted
    }

    /// Discard everything buffered
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Extract the next complete frame
    ///
    /// Returns `None` until a full delimited frame is buffered. Bytes outside
    /// frame delimiters are dropped. When the buffer is full and holds no
    /// complete frame the partial frame is discarded and `Overflow` returned.
    pub fn next_frame(&mut self) -> Option<Result<KissFrame, FramingError>> {
        loop {
            let start = match self.buffer.iter().position(|&b| b == FEND) {
                Some(start) => start,
                None => {
                    self.buffer.clear();
                    return None;
                }
            };
            self.buffer.advance(start);

            let end = match self.buffer[1..].iter().position(|&b| b == FEND) {
                Some(offset) => offset + 1,
                None => {
                    if self.buffer.len() >= self.capacity {
                        let discarded = self.buffer.len();
                        self.buffer.clear();
                        return Some(Err(FramingError::Overflow { discarded }));
                    }
                    return None;
                }
            };

            // Back-to-back FENDs: the closing one may open the next frame
            if end == 1 {
                self.buffer.advance(1);
                continue;
            }

            let raw = self.buffer.split_to(end);
            trace!(len = raw.len() + 1, "KISS frame delimited");
            return Some(parse_frame(&raw[1..]));
        }
    }
}

impl Default for KissDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_frame(raw: &[u8]) -> Result<KissFrame, FramingError> {
    let unescaped = unescape(raw)?;
    let mut body = unescaped.freeze();

    let command_byte = body.get_u8();
    let (port, command) = if command_byte == CMD_RETURN {
        (0x0F, CMD_RETURN)
    } else {
        (command_byte >> 4, command_byte & 0x0F)
    };

    Ok(KissFrame {
        port,
        command,
        data: body,
    })
}
