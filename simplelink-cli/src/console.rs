//! Console input handling
//!
//! Each input line is either a message (`CALL1->CALL2 text`) or one of a few
//! slash commands.

use bytes::Bytes;
use simplelink_protocol::{Address, Prn, RouteError, MAX_PAYLOAD};
use std::str::FromStr;
use thiserror::Error;

/// Parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send `payload` along `hops`
    Send { hops: Vec<Address>, payload: Bytes },
    /// Abandon an outstanding message
    Cancel(Prn),
    /// Print statistics
    Stats,
    Help,
    Quit,
    /// Blank line
    Empty,
}

/// Console input errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Missing message text after route")]
    MissingMessage,

    #[error("Invalid route: {0}")]
    Route(#[from] RouteError),

    #[error("Message too long: {size} bytes (max {max})")]
    TooLong { size: usize, max: usize },

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
  CALL1->CALL2 message   send a message along a route (use * for any station)
  /cancel PRN            stop retrying an outstanding message
  /stats                 print link statistics
  /quit                  exit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Command::Empty);
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut words = rest.split_whitespace();
            return match words.next().unwrap_or("") {
                "quit" | "exit" => Ok(Command::Quit),
                "stats" => Ok(Command::Stats),
                "help" | "?" => Ok(Command::Help),
                "cancel" => words
                    .next()
                    .and_then(|w| w.trim_start_matches('#').parse::<u32>().ok())
                    .filter(|&n| n != 0)
                    .map(|n| Command::Cancel(Prn::new(n)))
                    .ok_or(CommandError::Usage("/cancel PRN")),
                other => Err(CommandError::Unknown(other.to_string())),
            };
        }

        let (path, message) = match line.split_once(char::is_whitespace) {
            Some((path, message)) => (path, message.trim()),
            None => (line, ""),
        };
        if message.is_empty() {
            return Err(CommandError::MissingMessage);
        }

        let hops = parse_hops(path)?;
        if message.len() > MAX_PAYLOAD {
            return Err(CommandError::TooLong {
                size: message.len(),
                max: MAX_PAYLOAD,
            });
        }

        Ok(Command::Send {
            hops,
            payload: Bytes::copy_from_slice(message.as_bytes()),
        })
    }
}

/// Parse `CALL1->CALL2->...` into hop addresses
pub fn parse_hops(path: &str) -> Result<Vec<Address>, RouteError> {
    let route = simplelink_protocol::Route::parse(path)?;
    Ok(route.remaining().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message() {
        let cmd: Command = "KI7EST->N0CALL hello there".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Send {
                hops: vec![
                    Address::encode("KI7EST").unwrap(),
                    Address::encode("N0CALL").unwrap()
                ],
                payload: Bytes::from_static(b"hello there"),
            }
        );
    }

    #[test]
    fn test_parse_broadcast_hop() {
        match "*->ki7est hi".parse::<Command>().unwrap() {
            Command::Send { hops, .. } => {
                assert_eq!(hops[0], Address::BROADCAST);
                assert_eq!(hops[1].to_string(), "KI7EST");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "KI7EST".parse::<Command>(),
            Err(CommandError::MissingMessage)
        );
        assert!(matches!(
            "TOOLONGCALL hi".parse::<Command>(),
            Err(CommandError::Route(_))
        ));
        assert!(matches!(
            "A->->B hi".parse::<Command>(),
            Err(CommandError::Route(_))
        ));
        assert_eq!(
            "/frobnicate".parse::<Command>(),
            Err(CommandError::Unknown("frobnicate".to_string()))
        );
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!("/quit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("  /stats ".parse::<Command>().unwrap(), Command::Stats);
        assert_eq!("".parse::<Command>().unwrap(), Command::Empty);
        assert_eq!(
            "/cancel #12".parse::<Command>().unwrap(),
            Command::Cancel(Prn::new(12))
        );
        assert!("/cancel 0".parse::<Command>().is_err());
        assert!("/cancel".parse::<Command>().is_err());
    }
}
