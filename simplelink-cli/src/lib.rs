//! SimpleLink CLI Library
//!
//! Shared functionality for the `simplelink` console: configuration files,
//! console line parsing and statistics display.

pub mod config;
pub mod console;
pub mod stats;

pub use config::{
    parse_kiss_setting, Config, CongestionConfig, ConfigError, TncConfig, TncTransport,
};
pub use console::{Command, CommandError};
pub use stats::{compact_stats, display_stats, format_bytes, format_duration};
