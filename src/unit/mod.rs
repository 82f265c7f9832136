//! Transactional Unit Lifecycle
//!
//! State, errors and the pure transition logic shared by the store and the
//! inbound dispatch adapter.
//!
//! # State Machine
//!
//! ```text
//! check → CREATED → EXECUTED → COMMITTED → CONFIRMED
//!            ↓          ↓
//!          ROLLED_BACK ←┘   (re-armed: check answers OK again)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Check Gates Execution**: `check` answers OK only for CREATED or ROLLED_BACK
//! 2. **Persist-Before-Reply**: a transition is durable before the transport sees OK
//! 3. **Strict Ordering**: lifecycle events on an unknown TID are protocol violations
//! 4. **Idempotent Terminals**: repeated commit/confirm are no-ops, not errors

pub mod error;
pub mod machine;
pub mod state;
pub mod types;

pub use error::UnitError;
pub use machine::{Transition, decide};
pub use state::UnitState;
pub use types::{RcStatus, ServerHandle, UnitCallType, UnitEvent, UnitRecord};
