//! Frame Codec
//!
//! A frame body is laid out big-endian as:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              PRN                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |          Route (17 x 32-bit addresses)        :
//! +-+-+-+-+-+-+-+-+                                               :
//! :                                                               :
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Payload Length         |         Payload ...           :
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  CRC-32 of all preceding bytes                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! and travels inside a KISS data frame.

use crate::address::Address;
use crate::kiss::{self, FramingError, KissDecoder};
use crate::packet::{Packet, PacketKind, MAX_PAYLOAD};
use crate::prn::Prn;
use crate::route::{Route, WireRoute, WIRE_SLOTS};
use bytes::{Buf, BufMut, BytesMut};
use crc::{Crc, CRC_32_ISO_HDLC};
use thiserror::Error;
use tracing::trace;

/// CRC-32 used for frame integrity
pub const FRAME_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Size of the encoded route
pub const ROUTE_SIZE: usize = WIRE_SLOTS * 4;

/// PRN, kind, route and payload length
pub const HEADER_SIZE: usize = 4 + 1 + ROUTE_SIZE + 2;

/// Size of the trailing checksum
pub const CRC_SIZE: usize = 4;

/// Smallest valid body (no payload)
pub const MIN_BODY_SIZE: usize = HEADER_SIZE + CRC_SIZE;

/// Largest valid body
pub const MAX_BODY_SIZE: usize = MIN_BODY_SIZE + MAX_PAYLOAD;

/// Largest possible KISS frame on the wire
pub const MAX_ENCODED_FRAME: usize = kiss::max_encoded_len(MAX_BODY_SIZE);

/// Frame codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("CRC mismatch: computed 0x{computed:08x}, frame carries 0x{carried:08x}")]
    CrcMismatch { computed: u32, carried: u32 },

    #[error("Malformed frame: {0}")]
    Malformed(&'static str),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Serialize a packet into a frame body including the checksum
pub fn encode_body(packet: &Packet) -> Result<BytesMut, FrameError> {
    if packet.payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: packet.payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let mut body = BytesMut::with_capacity(MIN_BODY_SIZE + packet.payload.len());
    body.put_u32(packet.prn.as_raw());
    body.put_u8(packet.kind.as_u8());
    for addr in packet.route.to_wire() {
        body.put_u32(addr.as_raw());
    }
    body.put_u16(packet.payload.len() as u16);
    body.put_slice(&packet.payload);

    let crc = FRAME_CRC.checksum(&body);
    body.put_u32(crc);

    Ok(body)
}

/// Serialize a packet into a complete KISS data frame on `port`
pub fn encode(packet: &Packet, port: u8) -> Result<BytesMut, FrameError> {
    let body = encode_body(packet)?;
    Ok(kiss::encode_frame(&body, port))
}

/// Parse a frame body
///
/// The checksum is verified before any field is interpreted.
pub fn decode_body(body: &[u8]) -> Result<Packet, FrameError> {
    if body.len() < MIN_BODY_SIZE {
        return Err(FrameError::Malformed("frame shorter than header"));
    }

    let (covered, mut trailer) = body.split_at(body.len() - CRC_SIZE);
    let carried = trailer.get_u32();
    let computed = FRAME_CRC.checksum(covered);
    if computed != carried {
        return Err(FrameError::CrcMismatch { computed, carried });
    }

    let mut buf = covered;
    let prn = Prn::new(buf.get_u32());
    if prn.is_none() {
        return Err(FrameError::Malformed("zero PRN"));
    }

    let kind = PacketKind::from_u8(buf.get_u8()).ok_or(FrameError::Malformed("unknown kind"))?;

    let mut wire: WireRoute = [Address::NONE; WIRE_SLOTS];
    for slot in wire.iter_mut() {
        *slot = Address::from_raw(buf.get_u32());
    }
    let route = Route::from_wire(&wire).map_err(|_| FrameError::Malformed("invalid route"))?;

    let payload_len = buf.get_u16() as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: MAX_PAYLOAD,
        });
    }
    if payload_len != buf.remaining() {
        return Err(FrameError::Malformed("payload length mismatch"));
    }
    if kind == PacketKind::Ack && payload_len != 0 {
        return Err(FrameError::Malformed("ack with payload"));
    }

    let payload = buf.copy_to_bytes(payload_len);

    Ok(Packet {
        prn,
        kind,
        route,
        payload,
    })
}

/// Streaming packet decoder over a KISS byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    kiss: KissDecoder,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_capacity(kiss::DEFAULT_DECODER_CAPACITY)
    }

    /// Create a decoder whose buffer holds at least two worst-case frames
    pub fn with_capacity(capacity: usize) -> Self {
        FrameDecoder {
            kiss: KissDecoder::with_capacity(capacity.max(MAX_ENCODED_FRAME * 2)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.kiss.capacity()
    }

    pub fn free_space(&self) -> usize {
        self.kiss.free_space()
    }

    pub fn buffered(&self) -> usize {
        self.kiss.len()
    }

    /// Buffer incoming bytes, returning how many were accepted
    pub fn push(&mut self, data: &[u8]) -> usize {
        self.kiss.push(data)
    }

    pub fn reset(&mut self) {
        self.kiss.reset();
    }

    /// Decode the next packet from buffered data frames
    ///
    /// KISS frames carrying other commands are skipped.
    pub fn next_packet(&mut self) -> Option<Result<Packet, FrameError>> {
        loop {
            let frame = match self.kiss.next_frame()? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };

            if !frame.is_data() {
                trace!(command = frame.command, port = frame.port, "skipping KISS command frame");
                continue;
            }

            return Some(decode_body(&frame.data));
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiss::{encode_command, KissCommand};
    use bytes::Bytes;

    fn addr(call: &str) -> Address {
        Address::encode(call).unwrap()
    }

    fn sample_packet() -> Packet {
        let route = Route::new(&[addr("KF7SJK")])
            .unwrap()
            .depart(addr("KI7EST"))
            .unwrap();
        Packet::data(Prn::new(0x0102_0304), route, Bytes::from_static(b"test message"))
    }

    #[test]
    fn test_body_layout() {
        let body = encode_body(&sample_packet()).unwrap();

        assert_eq!(body.len(), MIN_BODY_SIZE + 12);
        assert_eq!(&body[0..4], &[1, 2, 3, 4]);
        assert_eq!(body[4], PacketKind::Data.as_u8());
        assert_eq!(&body[5..9], &addr("KI7EST").as_raw().to_be_bytes());
        assert_eq!(&body[9..13], &[0, 0, 0, 0]);
        assert_eq!(&body[HEADER_SIZE - 2..HEADER_SIZE], &[0, 12]);
    }

    #[test]
    fn test_roundtrip() {
        let packet = sample_packet();
        let body = encode_body(&packet).unwrap();
        assert_eq!(decode_body(&body).unwrap(), packet);
    }

    #[test]
    fn test_ack_roundtrip() {
        let ack = Packet::ack(Prn::new(9), sample_packet().route.reply());
        let body = encode_body(&ack).unwrap();
        assert_eq!(body.len(), MIN_BODY_SIZE);
        assert_eq!(decode_body(&body).unwrap(), ack);
    }

    #[test]
    fn test_max_payload() {
        let mut packet = sample_packet();
        packet.payload = Bytes::from(vec![0xAA; MAX_PAYLOAD]);
        assert!(encode_body(&packet).is_ok());

        packet.payload = Bytes::from(vec![0xAA; MAX_PAYLOAD + 1]);
        assert_eq!(
            encode_body(&packet),
            Err(FrameError::PayloadTooLarge {
                size: MAX_PAYLOAD + 1,
                max: MAX_PAYLOAD
            })
        );
    }

    #[test]
    fn test_every_single_bit_flip_detected() {
        let body = encode_body(&sample_packet()).unwrap();

        for bit in 0..body.len() * 8 {
            let mut corrupted = body.clone();
            corrupted[bit / 8] ^= 1 << (bit % 8);
            assert!(
                matches!(decode_body(&corrupted), Err(FrameError::CrcMismatch { .. })),
                "bit {} not detected",
                bit
            );
        }
    }

    fn with_crc(mut covered: BytesMut) -> BytesMut {
        let crc = FRAME_CRC.checksum(&covered);
        covered.put_u32(crc);
        covered
    }

    #[test]
    fn test_short_frame() {
        assert_eq!(
            decode_body(&[0u8; 10]),
            Err(FrameError::Malformed("frame shorter than header"))
        );
    }

    #[test]
    fn test_zero_prn_rejected() {
        let mut body = encode_body(&sample_packet()).unwrap();
        body.truncate(body.len() - CRC_SIZE);
        body[0..4].copy_from_slice(&[0, 0, 0, 0]);

        assert_eq!(
            decode_body(&with_crc(body)),
            Err(FrameError::Malformed("zero PRN"))
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut body = encode_body(&sample_packet()).unwrap();
        body.truncate(body.len() - CRC_SIZE);
        body[4] = 7;

        assert_eq!(
            decode_body(&with_crc(body)),
            Err(FrameError::Malformed("unknown kind"))
        );
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut body = encode_body(&sample_packet()).unwrap();
        body.truncate(body.len() - CRC_SIZE);
        body[HEADER_SIZE - 1] = 11;

        assert_eq!(
            decode_body(&with_crc(body)),
            Err(FrameError::Malformed("payload length mismatch"))
        );
    }

    #[test]
    fn test_route_without_separator_rejected() {
        let mut body = encode_body(&sample_packet()).unwrap();
        body.truncate(body.len() - CRC_SIZE);
        for slot in 0..WIRE_SLOTS {
            let offset = 5 + slot * 4;
            body[offset..offset + 4].copy_from_slice(&addr("X").as_raw().to_be_bytes());
        }

        assert_eq!(
            decode_body(&with_crc(body)),
            Err(FrameError::Malformed("invalid route"))
        );
    }

    #[test]
    fn test_stream_decoder() {
        let packet = sample_packet();
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&encode_command(KissCommand::TxDelay, 30, 0));
        stream.extend_from_slice(&encode(&packet, 0).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&stream);

        assert_eq!(decoder.next_packet(), Some(Ok(packet)));
        assert_eq!(decoder.next_packet(), None);
    }

    #[test]
    fn test_stream_decoder_reports_corruption() {
        let mut frame = encode(&sample_packet(), 0).unwrap();
        let idx = frame
            .windows(7)
            .position(|w| w == b"message")
            .unwrap();
        frame[idx] ^= 0x01;

        let mut decoder = FrameDecoder::new();
        decoder.push(&frame);
        assert!(matches!(
            decoder.next_packet(),
            Some(Err(FrameError::CrcMismatch { .. }))
        ));
    }

    #[test]
    fn test_decoder_minimum_capacity() {
        let decoder = FrameDecoder::with_capacity(16);
        assert_eq!(decoder.capacity(), MAX_ENCODED_FRAME * 2);
    }
}
