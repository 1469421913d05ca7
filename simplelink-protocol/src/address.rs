//! Station Address Codec
//!
//! Stations are identified on the wire by a 32-bit value. Callsign text of up
//! to six characters from `[0-9A-Z]` maps onto that value as a radix-37
//! number whose zero digit is a pad symbol, so trailing padding never changes
//! the callsign and no valid callsign can encode to the reserved values.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of characters in a callsign
pub const MAX_CALLSIGN_LEN: usize = 6;

/// Radix of the positional encoding (pad + 10 digits + 26 letters)
const RADIX: u32 = 37;

/// Largest value reachable from a valid callsign (37^6 - 1)
pub const MAX_ENCODED: u32 = 2_565_726_408;

/// Textual form of the broadcast wildcard
pub const BROADCAST_TEXT: &str = "*";

/// Address codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Callsign is empty")]
    Empty,

    #[error("Callsign too long: {len} characters (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Invalid callsign character: {0:?}")]
    InvalidCharacter(char),
}

/// Station address in wire format
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Address(u32);

impl Address {
    /// Reserved "no address" value, also the route cursor on the wire
    pub const NONE: Address = Address(0);

    /// Wildcard hop that any station may claim
    pub const BROADCAST: Address = Address(0xFFFF_FFFF);

    /// Wrap a raw wire value
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Address(raw)
    }

    /// Get the raw wire value
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Address::NONE
    }

    #[inline]
    pub fn is_broadcast(self) -> bool {
        self == Address::BROADCAST
    }

    /// Encode callsign text into an address
    ///
    /// Input is case-normalized. The first character is the least
    /// significant digit.
    ///
    /// # Examples
    ///
    /// ```
    /// use simplelink_protocol::address::Address;
    ///
    /// let addr = Address::encode("ki7est").unwrap();
    /// assert_eq!(addr.decode().as_deref(), Some("KI7EST"));
    /// ```
    pub fn encode(text: &str) -> Result<Self, AddressError> {
        let text = text.trim();
        if text == BROADCAST_TEXT {
            return Ok(Address::BROADCAST);
        }
        if text.is_empty() {
            return Err(AddressError::Empty);
        }

        let len = text.chars().count();
        if len > MAX_CALLSIGN_LEN {
            return Err(AddressError::TooLong {
                len,
                max: MAX_CALLSIGN_LEN,
            });
        }

        let mut value = 0u32;
        for ch in text.chars().rev() {
            let digit = character_to_digit(ch).ok_or(AddressError::InvalidCharacter(ch))?;
            value = value * RADIX + digit;
        }

        Ok(Address(value))
    }

    /// Decode back into callsign text with trailing pad removed
    ///
    /// Returns `None` for the reserved values and for raw values no callsign
    /// encodes to, including any with a pad digit below a real character.
    pub fn decode(self) -> Option<String> {
        if self.is_none() || self.0 > MAX_ENCODED {
            return None;
        }

        let mut remainder = self.0;
        let mut text = String::with_capacity(MAX_CALLSIGN_LEN);
        for _ in 0..MAX_CALLSIGN_LEN {
            text.push(digit_to_character(remainder % RADIX));
            remainder /= RADIX;
        }

        let trimmed = text.trim_end_matches(PAD).len();
        text.truncate(trimmed);
        if text.contains(PAD) {
            return None;
        }
        Some(text)
    }
}

/// Pad symbol used internally for unused character slots
const PAD: char = ' ';

fn character_to_digit(ch: char) -> Option<u32> {
    match ch.to_ascii_uppercase() {
        c @ '0'..='9' => Some(c as u32 - '0' as u32 + 1),
        c @ 'A'..='Z' => Some(c as u32 - 'A' as u32 + 11),
        _ => None,
    }
}

fn digit_to_character(digit: u32) -> char {
    match digit {
        0 => PAD,
        1..=10 => (b'0' + (digit - 1) as u8) as char,
        _ => (b'A' + (digit - 11) as u8) as char,
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::encode(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            return f.write_str(BROADCAST_TEXT);
        }
        if self.is_none() {
            return f.write_str("-");
        }
        match self.decode() {
            Some(text) => f.write_str(&text),
            None => write!(f, "#{:08x}", self.0),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl From<Address> for u32 {
    fn from(addr: Address) -> u32 {
        addr.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_character() {
        assert_eq!(Address::encode("0").unwrap().as_raw(), 1);
        assert_eq!(Address::encode("A").unwrap().as_raw(), 11);
        assert_eq!(Address::encode("Z").unwrap().as_raw(), 36);
    }

    #[test]
    fn test_positional() {
        // "00" = 1 + 1 * 37
        assert_eq!(Address::encode("00").unwrap().as_raw(), 38);
    }

    #[test]
    fn test_roundtrip() {
        for call in ["KI7EST", "KF7SJK", "S53MV", "W1AW", "N0", "Q"] {
            let addr = Address::encode(call).unwrap();
            assert_eq!(addr.decode().unwrap(), call);
        }
    }

    #[test]
    fn test_trailing_zero_digit_survives() {
        // '0' is a real digit, not the pad symbol
        let addr = Address::encode("KI7E50").unwrap();
        assert_eq!(addr.decode().unwrap(), "KI7E50");
    }

    #[test]
    fn test_case_normalized() {
        assert_eq!(
            Address::encode("ki7est").unwrap(),
            Address::encode("KI7EST").unwrap()
        );
    }

    #[test]
    fn test_max_value() {
        let addr = Address::encode("ZZZZZZ").unwrap();
        assert_eq!(addr.as_raw(), MAX_ENCODED);
        assert!(!addr.is_broadcast());
    }

    #[test]
    fn test_errors() {
        assert_eq!(Address::encode(""), Err(AddressError::Empty));
        assert_eq!(
            Address::encode("ABCDEFG"),
            Err(AddressError::TooLong { len: 7, max: 6 })
        );
        assert_eq!(
            Address::encode("KI-7"),
            Err(AddressError::InvalidCharacter('-'))
        );
        assert_eq!(
            Address::encode("A B"),
            Err(AddressError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_broadcast() {
        let addr: Address = "*".parse().unwrap();
        assert!(addr.is_broadcast());
        assert_eq!(addr.to_string(), "*");
        assert_eq!(addr.decode(), None);
    }

    #[test]
    fn test_reserved_values_do_not_decode() {
        assert_eq!(Address::NONE.decode(), None);
        assert_eq!(Address::from_raw(MAX_ENCODED + 1).decode(), None);
        assert_eq!(Address::NONE.to_string(), "-");
        assert_eq!(Address::from_raw(0x9000_0000).to_string(), "#90000000");
    }

    #[test]
    fn test_internal_pad_does_not_decode() {
        // 37 is a pad digit followed by "0"
        assert_eq!(Address::from_raw(37).decode(), None);
        assert_eq!(Address::from_raw(37).to_string(), "#00000025");
        // "0" then pad then "0"
        assert_eq!(Address::from_raw(1 + 37 * 37).decode(), None);
        assert_eq!(Address::from_raw(38).decode().unwrap(), "00");
    }
}
