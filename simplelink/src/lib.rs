//! SimpleLink - reliable messaging over KISS TNC links
//!
//! High-level Rust API for the SimpleLink link engine and its transports.

pub use simplelink_io as io;
pub use simplelink_protocol as protocol;

// Re-export commonly used types
pub use io::{KissSerial, KissTcp, Loopback, SharedMedium, Ticker};
pub use protocol::{
    Address, EventSink, LinkConfig, LinkEngine, LinkEvent, Packet, Prn, Route, SendError,
};
