//! Unit Core Types
//!
//! Types shared by the store, the state machine and the dispatch adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::UnitState;
use crate::tid::Tid;

/// Return code handed back to the transport
///
/// Numeric values match the RFC return codes the transport understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RcStatus {
    Ok = 0,
    /// Transient failure, the transport should redeliver later
    Retry = 14,
    /// Store or application failure, do not proceed
    ExternalFailure = 15,
    /// The unit already progressed past `check`, do not execute again
    Executed = 16,
    NotFound = 17,
    /// No handler configured for the system
    NotSupported = 18,
    /// Phase invoked out of order
    IllegalState = 19,
    InvalidParameter = 20,
}

impl RcStatus {
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, RcStatus::Ok)
    }

    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RcStatus::Ok),
            14 => Some(RcStatus::Retry),
            15 => Some(RcStatus::ExternalFailure),
            16 => Some(RcStatus::Executed),
            17 => Some(RcStatus::NotFound),
            18 => Some(RcStatus::NotSupported),
            19 => Some(RcStatus::IllegalState),
            20 => Some(RcStatus::InvalidParameter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RcStatus::Ok => "RFC_OK",
            RcStatus::Retry => "RFC_RETRY",
            RcStatus::ExternalFailure => "RFC_EXTERNAL_FAILURE",
            RcStatus::Executed => "RFC_EXECUTED",
            RcStatus::NotFound => "RFC_NOT_FOUND",
            RcStatus::NotSupported => "RFC_NOT_SUPPORTED",
            RcStatus::IllegalState => "RFC_ILLEGAL_STATE",
            RcStatus::InvalidParameter => "RFC_INVALID_PARAMETER",
        }
    }
}

impl fmt::Display for RcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the transport delivered a call
///
/// Only asynchronous deliveries leave the outcome unknown to the sender, so
/// only they record `executed` after the business function returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCallType {
    #[default]
    Undefined,
    Synchronous,
    Asynchronous,
}

/// Lifecycle events the transport can raise for a TID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitEvent {
    Check,
    /// Business function call inside the unit
    Execute,
    MarkExecuted,
    Commit,
    Rollback,
    Confirm,
    GetState,
}

impl UnitEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitEvent::Check => "check",
            UnitEvent::Execute => "execute",
            UnitEvent::MarkExecuted => "mark_executed",
            UnitEvent::Commit => "commit",
            UnitEvent::Rollback => "rollback",
            UnitEvent::Confirm => "confirm",
            UnitEvent::GetState => "get_state",
        }
    }
}

impl fmt::Display for UnitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted record for one TID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub tid: Tid,
    pub status: UnitState,
    /// Free-text annotation, e.g. the function that executed
    pub note: Option<String>,
    /// Last update time (informational only)
    pub timestamp: DateTime<Utc>,
}

impl UnitRecord {
    pub fn new(tid: Tid, status: UnitState, note: Option<String>) -> Self {
        Self {
            tid,
            status,
            note,
            timestamp: Utc::now(),
        }
    }
}

/// Opaque transport handle for one inbound connection
///
/// Carries the logical system id so the adapter can route to the handler set
/// registered for that backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerHandle {
    pub id: u64,
    pub system_id: String,
}

impl ServerHandle {
    pub fn new(id: u64, system_id: impl Into<String>) -> Self {
        Self {
            id,
            system_id: system_id.into(),
        }
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.system_id, self.id)
    }
}
