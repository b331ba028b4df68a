//! Hardware address normalization.
//!
//! Radios report addresses with inconsistent casing (`aa:bb:..` on one
//! platform, `AA:BB:..` on another, a bare UUID on macOS). A
//! [`DeviceAddress`] is built once at the boundary and carries both
//! canonical forms: a lowercase key for lookups and an uppercase form for
//! storage and display.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ParseError, ParseResult};

/// A normalized hardware identifier (MAC address or platform peripheral id).
///
/// Equality and hashing use the lowercase key, so two addresses that differ
/// only in case are the same address.
///
/// # Examples
///
/// ```
/// use netnexus_types::DeviceAddress;
///
/// let addr = DeviceAddress::parse(" aa:bb:cc:dd:ee:ff ").unwrap();
/// assert_eq!(addr.key(), "aa:bb:cc:dd:ee:ff");
/// assert_eq!(addr.display(), "AA:BB:CC:DD:EE:FF");
/// assert!(addr.matches("AA:BB:CC:DD:EE:FF"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress {
    key: String,
}

impl DeviceAddress {
    /// Parse and normalize a raw address string.
    ///
    /// Surrounding whitespace is ignored. Accepted characters are ASCII
    /// alphanumerics plus the `:`, `-`, `_` and `.` separators used by the
    /// various platforms.
    pub fn parse(raw: &str) -> ParseResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyAddress);
        }

        if let Some(character) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.')))
        {
            return Err(ParseError::InvalidAddress {
                address: trimmed.to_string(),
                character,
            });
        }

        Ok(Self {
            key: trimmed.to_ascii_lowercase(),
        })
    }

    /// The lowercase lookup key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The uppercase form used for storage and display.
    #[must_use]
    pub fn display(&self) -> String {
        self.key.to_ascii_uppercase()
    }

    /// Case-insensitive comparison against a raw address string.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        self.key.eq_ignore_ascii_case(raw.trim())
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl FromStr for DeviceAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for DeviceAddress {
    type Error = ParseError;

    fn try_from(value: &str) -> ParseResult<Self> {
        Self::parse(value)
    }
}

#[cfg(feature = "serde")]
impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let lower = DeviceAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let upper = DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        let mixed = DeviceAddress::parse("Aa:bB:cC:Dd:eE:Ff").unwrap();

        assert_eq!(lower, upper);
        assert_eq!(upper, mixed);
        assert_eq!(mixed.key(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mixed.display(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(mixed.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let addr = DeviceAddress::parse("  11:22:33:44:55:66\n").unwrap();
        assert_eq!(addr.key(), "11:22:33:44:55:66");
    }

    #[test]
    fn test_parse_accepts_platform_ids() {
        // CoreBluetooth exposes UUIDs instead of MAC addresses
        let addr = DeviceAddress::parse("6F1A2B3C-0000-4D5E-8F90-ABCDEF012345").unwrap();
        assert_eq!(addr.key(), "6f1a2b3c-0000-4d5e-8f90-abcdef012345");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(DeviceAddress::parse(""), Err(ParseError::EmptyAddress));
        assert_eq!(DeviceAddress::parse("   "), Err(ParseError::EmptyAddress));
    }

    #[test]
    fn test_parse_rejects_invalid_characters() {
        let err = DeviceAddress::parse("aa:bb;cc").unwrap_err();
        assert!(matches!(err, ParseError::InvalidAddress { character: ';', .. }));
        assert!(err.to_string().contains("aa:bb;cc"));
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let addr = DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert!(addr.matches("aa:bb:cc:dd:ee:ff"));
        assert!(addr.matches(" AA:bb:CC:dd:EE:ff "));
        assert!(!addr.matches("AA:BB:CC:DD:EE:00"));
    }

    #[test]
    fn test_from_str() {
        let addr: DeviceAddress = "de:ad:be:ef:00:01".parse().unwrap();
        assert_eq!(addr.display(), "DE:AD:BE:EF:00:01");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_uses_uppercase_form() {
        let addr = DeviceAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");

        let back: DeviceAddress = serde_json::from_str("\"aa:BB:cc:DD:ee:FF\"").unwrap();
        assert_eq!(back, addr);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<DeviceAddress, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }
}
