//! SimpleLink Protocol Core Implementation
//!
//! This crate implements the SimpleLink reliable message protocol for
//! KISS-framed amateur-radio TNC links: callsign addressing, source routes,
//! KISS and CRC-32 framing, the ARQ table with retry back-off, duplicate
//! suppression, congestion strategies and the link engine that drives them
//! from a periodic tick.

pub mod address;
pub mod arq;
pub mod congestion;
pub mod dedup;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod frame;
pub mod kiss;
pub mod packet;
pub mod prn;
pub mod route;
pub mod transport;

pub use address::{Address, AddressError};
pub use arq::{ArqConfig, ArqEntry, ArqError, ArqTable, Backoff};
pub use congestion::{CarrierSense, ChannelState, CongestionControl, NeverDefer, PPersistence};
pub use dedup::RecentPrns;
pub use dispatch::{classify, Disposition};
pub use engine::{
    EngineState, EngineStats, InitError, LinkConfig, LinkEngine, SendError, TickReport,
};
pub use event::{sink_fn, EventSink, LinkEvent};
pub use frame::{FrameDecoder, FrameError};
pub use kiss::{FramingError, KissCommand, KissDecoder, KissFrame};
pub use packet::{Packet, PacketKind, MAX_PAYLOAD};
pub use prn::{Prn, PrnAllocator};
pub use route::{Route, RouteError, ROUTE_CAPACITY};
pub use transport::{ByteSink, ByteSource, Transport};
