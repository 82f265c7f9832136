use thiserror::Error;

use crate::unit::RcStatus;

/// Client-side unit errors
///
/// `NoTransactionHandle` and `ActiveUnitExists` are local misuse of the
/// connection, `Validation` is raised before anything is sent, `Remote`
/// carries the receiving side's refusal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("No transaction handle for this connection available.")]
    NoTransactionHandle,

    #[error("Active unit {0} already exists on this connection")]
    ActiveUnitExists(String),

    #[error("Invalid unit: {0}")]
    Validation(String),

    #[error("Remote refused {phase}: {rc}: {message}")]
    Remote {
        phase: &'static str,
        rc: RcStatus,
        message: String,
    },

    #[error("Transport failure: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::NoTransactionHandle => "NO_TRANSACTION_HANDLE",
            ClientError::ActiveUnitExists(_) => "ACTIVE_UNIT_EXISTS",
            ClientError::Validation(_) => "VALIDATION",
            ClientError::Remote { .. } => "REMOTE",
            ClientError::Transport(_) => "TRANSPORT",
        }
    }

    pub(crate) fn remote(phase: &'static str, rc: RcStatus, message: impl Into<String>) -> Self {
        ClientError::Remote {
            phase,
            rc,
            message: message.into(),
        }
    }

    /// Return code of a remote refusal
    pub fn rc(&self) -> Option<RcStatus> {
        match self {
            ClientError::Remote { rc, .. } => Some(*rc),
            _ => None,
        }
    }
}
