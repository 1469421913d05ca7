//! Link Packets
//!
//! A packet is either a data message or the acknowledgement of one. Both carry
//! the PRN assigned by the originator and a source route; only data packets
//! carry a payload.

use crate::prn::Prn;
use crate::route::Route;
use bytes::Bytes;
use std::fmt;

/// Maximum payload carried by a single frame
pub const MAX_PAYLOAD: usize = 1500;

/// Packet kinds as encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Reliable message
    Data = 0,
    /// End-to-end acknowledgement
    Ack = 1,
}

impl PacketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketKind::Data),
            1 => Some(PacketKind::Ack),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Data => f.write_str("DATA"),
            PacketKind::Ack => f.write_str("ACK"),
        }
    }
}

/// A decoded or to-be-encoded link packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub prn: Prn,
    pub kind: PacketKind,
    pub route: Route,
    pub payload: Bytes,
}

impl Packet {
    /// Create a data packet
    pub fn data(prn: Prn, route: Route, payload: Bytes) -> Self {
        Packet {
            prn,
            kind: PacketKind::Data,
            route,
            payload,
        }
    }

    /// Create an acknowledgement for `prn`
    pub fn ack(prn: Prn, route: Route) -> Self {
        Packet {
            prn,
            kind: PacketKind::Ack,
            route,
            payload: Bytes::new(),
        }
    }

    #[inline]
    pub fn is_data(&self) -> bool {
        self.kind == PacketKind::Data
    }

    #[inline]
    pub fn is_ack(&self) -> bool {
        self.kind == PacketKind::Ack
    }

    /// Same packet with the route replaced
    pub fn with_route(&self, route: Route) -> Self {
        Packet {
            prn: self.prn,
            kind: self.kind,
            route,
            payload: self.payload.clone(),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} prn={} [{}] {} bytes",
            self.kind,
            self.prn,
            self.route,
            self.payload.len()
        )
    }
}
