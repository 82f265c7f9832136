//! Transaction identifiers
//!
//! A TID names one logical unit of work across every retry of its delivery.
//! Background (bgRFC) units use a 32-character id, classic tRFC/qRFC units a
//! 24-character one. Both are upper-case hex generated from a v4 UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::unit::error::UnitError;

/// Length of a background (bgRFC) unit id
pub const BACKGROUND_TID_LEN: usize = 32;

/// Length of a classic tRFC/qRFC transaction id
pub const CLASSIC_TID_LEN: usize = 24;

/// Transaction ID
///
/// Immutable once created. Construction always validates the length, so a
/// `Tid` held anywhere in the crate is known to be 24 or 32 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tid(String);

impl Tid {
    /// Generate a fresh TID for a background or classic unit
    pub fn generate(background: bool) -> Self {
        let mut hex = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        if !background {
            hex.truncate(CLASSIC_TID_LEN);
        }
        Self(hex)
    }

    /// Parse and validate an externally supplied TID
    pub fn parse(raw: &str) -> Result<Self, UnitError> {
        if raw.len() != BACKGROUND_TID_LEN && raw.len() != CLASSIC_TID_LEN {
            return Err(UnitError::InvalidTid(format!(
                "length {} not {} or {}: '{}'",
                raw.len(),
                BACKGROUND_TID_LEN,
                CLASSIC_TID_LEN,
                raw
            )));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(UnitError::InvalidTid(format!(
                "non-alphanumeric character in '{}'",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Parse a TID that must belong to the given unit kind
    pub fn parse_for(raw: &str, background: bool) -> Result<Self, UnitError> {
        let tid = Self::parse(raw)?;
        if tid.is_background() != background {
            let expected = if background {
                BACKGROUND_TID_LEN
            } else {
                CLASSIC_TID_LEN
            };
            return Err(UnitError::InvalidTid(format!(
                "length {} but {} unit requires {}: '{}'",
                raw.len(),
                if background { "background" } else { "classic" },
                expected,
                raw
            )));
        }
        Ok(tid)
    }

    /// True for 32-character background unit ids
    #[inline]
    pub fn is_background(&self) -> bool {
        self.0.len() == BACKGROUND_TID_LEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Tid {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Tid {
    type Error = UnitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Tid> for String {
    fn from(tid: Tid) -> Self {
        tid.0
    }
}

/// Unit delivery kind
///
/// `T` units are processed in arbitrary order, `Q` units in queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitType {
    Transactional,
    Queued,
}

impl UnitType {
    pub fn as_char(&self) -> char {
        match self {
            UnitType::Transactional => 'T',
            UnitType::Queued => 'Q',
        }
    }
}

/// Identifier of a unit as seen by the transport: the TID plus its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitIdentifier {
    pub tid: Tid,
    pub unit_type: UnitType,
}

impl UnitIdentifier {
    pub fn new(tid: Tid, unit_type: UnitType) -> Self {
        Self { tid, unit_type }
    }

    pub fn is_background(&self) -> bool {
        self.tid.is_background()
    }
}

impl fmt::Display for UnitIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit_type.as_char(), self.tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_lengths() {
        let bg = Tid::generate(true);
        let classic = Tid::generate(false);
        assert_eq!(bg.as_str().len(), BACKGROUND_TID_LEN);
        assert_eq!(classic.as_str().len(), CLASSIC_TID_LEN);
        assert!(bg.is_background());
        assert!(!classic.is_background());
    }

    #[test]
    fn test_generate_unique() {
        let a = Tid::generate(true);
        let b = Tid::generate(true);
        assert_ne!(a, b);

        let c = Tid::generate(false);
        let d = Tid::generate(false);
        assert_ne!(c, d);
    }

    #[test]
    fn test_generated_tid_is_upper_hex() {
        let tid = Tid::generate(true);
        assert!(
            tid.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert!(matches!(Tid::parse("ABC"), Err(UnitError::InvalidTid(_))));
        assert!(matches!(
            Tid::parse(&"A".repeat(31)),
            Err(UnitError::InvalidTid(_))
        ));
        assert!(matches!(
            Tid::parse(&"A".repeat(33)),
            Err(UnitError::InvalidTid(_))
        ));
        assert!(Tid::parse(&"A".repeat(32)).is_ok());
        assert!(Tid::parse(&"A".repeat(24)).is_ok());
    }

    #[test]
    fn test_parse_rejects_whitespace() {
        let raw = format!("{} {}", "A".repeat(15), "B".repeat(16));
        assert_eq!(raw.len(), 32);
        assert!(matches!(Tid::parse(&raw), Err(UnitError::InvalidTid(_))));
    }

    #[test]
    fn test_parse_for_kind() {
        let bg = "A".repeat(32);
        let classic = "B".repeat(24);
        assert!(Tid::parse_for(&bg, true).is_ok());
        assert!(Tid::parse_for(&classic, false).is_ok());
        assert!(Tid::parse_for(&bg, false).is_err());
        assert!(Tid::parse_for(&classic, true).is_err());
    }

    #[test]
    fn test_serde_validates() {
        let ok: Result<Tid, _> = serde_json::from_str(&format!("\"{}\"", "C".repeat(32)));
        assert!(ok.is_ok());
        let bad: Result<Tid, _> = serde_json::from_str("\"SHORT\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_unit_identifier_display() {
        let id = UnitIdentifier::new(Tid::parse(&"D".repeat(32)).unwrap(), UnitType::Queued);
        assert_eq!(id.to_string(), format!("Q:{}", "D".repeat(32)));
    }
}
