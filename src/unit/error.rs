//! Unit Error Types
//!
//! Closed error taxonomy for the store, the state machine and the inbound
//! dispatch path. Every variant maps onto one transport return code.

use thiserror::Error;

use super::state::UnitState;
use super::types::{RcStatus, UnitEvent};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    // === Validation Errors ===
    #[error("Invalid TID: {0}")]
    InvalidTid(String),

    #[error("Unsupported TID status: {0}")]
    UnsupportedStatus(String),

    #[error("Handler set already registered for system '{0}'")]
    HandlerAlreadyRegistered(String),

    #[error("Function already registered: {0}")]
    FunctionAlreadyRegistered(String),

    // === Protocol Errors ===
    #[error("Protocol violation: {event} on TID {tid} in state {}", state_name(.state))]
    ProtocolViolation {
        tid: String,
        event: UnitEvent,
        state: Option<UnitState>,
    },

    #[error("Unit {0} already executed")]
    AlreadyExecuted(String),

    // === Configuration Errors ===
    #[error("No transaction handler configured for system '{0}'")]
    NotConfigured(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    // === Application Errors ===
    #[error("Function {name} failed: {reason}")]
    FunctionFailed { name: String, reason: String },

    // === Store Errors ===
    #[error("TID store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("TID log corrupt: {0}")]
    CorruptLog(String),
}

fn state_name(state: &Option<UnitState>) -> &'static str {
    match state {
        Some(s) => s.as_str(),
        None => "<none>",
    }
}

impl UnitError {
    /// Stable error code for logs and diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            UnitError::InvalidTid(_) => "INVALID_TID",
            UnitError::UnsupportedStatus(_) => "UNSUPPORTED_STATUS",
            UnitError::HandlerAlreadyRegistered(_) => "HANDLER_ALREADY_REGISTERED",
            UnitError::FunctionAlreadyRegistered(_) => "FUNCTION_ALREADY_REGISTERED",
            UnitError::ProtocolViolation { .. } => "PROTOCOL_VIOLATION",
            UnitError::AlreadyExecuted(_) => "ALREADY_EXECUTED",
            UnitError::NotConfigured(_) => "NOT_CONFIGURED",
            UnitError::FunctionNotFound(_) => "FUNCTION_NOT_FOUND",
            UnitError::FunctionFailed { .. } => "FUNCTION_FAILED",
            UnitError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            UnitError::CorruptLog(_) => "CORRUPT_LOG",
        }
    }

    /// Return code reported to the transport for this failure
    pub fn rc_status(&self) -> RcStatus {
        match self {
            UnitError::InvalidTid(_)
            | UnitError::UnsupportedStatus(_)
            | UnitError::HandlerAlreadyRegistered(_)
            | UnitError::FunctionAlreadyRegistered(_) => RcStatus::InvalidParameter,
            UnitError::ProtocolViolation { .. } => RcStatus::IllegalState,
            UnitError::AlreadyExecuted(_) => RcStatus::Executed,
            UnitError::FunctionNotFound(_) => RcStatus::NotFound,
            UnitError::NotConfigured(_) => RcStatus::NotSupported,
            UnitError::FunctionFailed { .. }
            | UnitError::StoreUnavailable(_)
            | UnitError::CorruptLog(_) => RcStatus::ExternalFailure,
        }
    }

}

impl From<std::io::Error> for UnitError {
    fn from(e: std::io::Error) -> Self {
        UnitError::StoreUnavailable(e.to_string())
    }
}
