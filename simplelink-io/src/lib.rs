//! SimpleLink I/O and Platform Abstraction
//!
//! Byte transports the link engine can attach to: KISS over TCP for software
//! and network TNCs, KISS over a serial port for hardware TNCs, an echo
//! loopback, and an in-memory shared radio channel for multi-station tests.
//! Also provides the tick pacing used by host loops.

pub mod loopback;
pub mod medium;
pub mod serial;
pub mod tcp;
pub mod time;

pub use loopback::Loopback;
pub use medium::{MediumError, MediumPort, SharedMedium, StationId};
pub use serial::{KissSerial, SerialError, DEFAULT_BAUD};
pub use tcp::{KissTcp, TcpError, DEFAULT_CONNECT_TIMEOUT};
pub use time::{Ticker, DEFAULT_TICK_MS};
