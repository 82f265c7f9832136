//! Unit State Definitions
//!
//! State names match the persisted log format (`created`, `executed`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::UnitError;

/// Unit lifecycle states
///
/// ```text
/// CREATED → EXECUTED → COMMITTED → CONFIRMED
///    ↓          ↓
///   ROLLED_BACK ┘
/// ```
///
/// IDs are stable and used by the binary WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UnitState {
    /// First observed by `check`, business logic not yet run
    Created = 1,

    /// Business function ran for an asynchronous unit, outcome not yet committed
    Executed = 2,

    /// Business effect committed
    Committed = 3,

    /// Terminal: sender acknowledged the commit
    Confirmed = 4,

    /// Business effect undone; the unit may be delivered again
    RolledBack = 5,
}

impl UnitState {
    pub const ALL: [UnitState; 5] = [
        UnitState::Created,
        UnitState::Executed,
        UnitState::Committed,
        UnitState::Confirmed,
        UnitState::RolledBack,
    ];

    /// States from which a redelivery of the same unit may run the business logic
    #[inline]
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, UnitState::Created | UnitState::RolledBack)
    }

    /// States meaning "this TID already progressed, never run it again"
    #[inline]
    pub fn is_progressed(&self) -> bool {
        !self.is_retry_safe()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Confirmed)
    }

    #[inline]
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(UnitState::Created),
            2 => Some(UnitState::Executed),
            3 => Some(UnitState::Committed),
            4 => Some(UnitState::Confirmed),
            5 => Some(UnitState::RolledBack),
            _ => None,
        }
    }

    /// Name used in the text log
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Created => "created",
            UnitState::Executed => "executed",
            UnitState::Committed => "committed",
            UnitState::Confirmed => "confirmed",
            UnitState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UnitState {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(UnitState::Created),
            "executed" => Ok(UnitState::Executed),
            "committed" => Ok(UnitState::Committed),
            "confirmed" => Ok(UnitState::Confirmed),
            "rolled_back" => Ok(UnitState::RolledBack),
            other => Err(UnitError::UnsupportedStatus(other.to_string())),
        }
    }
}

impl TryFrom<u8> for UnitState {
    type Error = UnitError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        UnitState::from_id(value).ok_or_else(|| UnitError::UnsupportedStatus(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_safe_states() {
        assert!(UnitState::Created.is_retry_safe());
        assert!(UnitState::RolledBack.is_retry_safe());

        assert!(!UnitState::Executed.is_retry_safe());
        assert!(!UnitState::Committed.is_retry_safe());
        assert!(!UnitState::Confirmed.is_retry_safe());
    }

    #[test]
    fn test_terminal_state() {
        assert!(UnitState::Confirmed.is_terminal());
        assert!(!UnitState::Committed.is_terminal());
        assert!(!UnitState::RolledBack.is_terminal());
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in UnitState::ALL {
            assert_eq!(UnitState::from_id(state.id()), Some(state));
        }
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(UnitState::from_id(0).is_none());
        assert!(UnitState::from_id(99).is_none());
        assert!(matches!(
            UnitState::try_from(7u8),
            Err(UnitError::UnsupportedStatus(_))
        ));
    }

    #[test]
    fn test_parse_names() {
        for state in UnitState::ALL {
            assert_eq!(state.as_str().parse::<UnitState>().unwrap(), state);
        }
        assert!(matches!(
            "in_process".parse::<UnitState>(),
            Err(UnitError::UnsupportedStatus(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(UnitState::Created.to_string(), "created");
        assert_eq!(UnitState::RolledBack.to_string(), "rolled_back");
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&UnitState::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
    }
}
