//! Unit State Machine
//!
//! Pure decision logic: given an event and the stored state of a TID, decide
//! what to write, whether the application handler runs, and what to answer
//! the transport. No I/O happens here; the dispatch adapter applies the
//! decision under the TID's lock.
//!
//! | Event         | Current                      | Write        | Reply      |
//! |---------------|------------------------------|--------------|------------|
//! | check         | none                         | CREATED      | OK         |
//! | check         | CREATED / ROLLED_BACK        | -            | OK         |
//! | check         | EXECUTED/COMMITTED/CONFIRMED | -            | EXECUTED   |
//! | execute       | CREATED / ROLLED_BACK        | -            | OK         |
//! | execute       | EXECUTED                     | -            | EXECUTED   |
//! | mark_executed | CREATED / ROLLED_BACK        | EXECUTED     | OK         |
//! | mark_executed | EXECUTED                     | -            | OK         |
//! | commit        | CREATED/EXECUTED/ROLLED_BACK | COMMITTED    | OK         |
//! | commit        | COMMITTED / CONFIRMED        | -            | OK         |
//! | rollback      | CREATED / EXECUTED           | ROLLED_BACK  | OK         |
//! | rollback      | ROLLED_BACK                  | -            | OK         |
//! | confirm       | COMMITTED                    | CONFIRMED    | OK         |
//! | confirm       | CONFIRMED                    | -            | OK         |
//! | get_state     | any                          | -            | OK/NOT_FOUND |
//!
//! Every other combination, including any lifecycle event on an unknown TID,
//! is a protocol violation.

use super::error::UnitError;
use super::state::UnitState;
use super::types::{RcStatus, UnitEvent};
use crate::tid::Tid;

/// Outcome of applying an event to the stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State to persist, `None` when the store is left untouched
    pub next: Option<UnitState>,
    /// Whether the application's handler for this phase should run
    pub run_handler: bool,
    /// Code returned to the transport when everything else succeeds
    pub reply: RcStatus,
}

impl Transition {
    fn write(next: UnitState) -> Self {
        Self {
            next: Some(next),
            run_handler: true,
            reply: RcStatus::Ok,
        }
    }

    fn noop() -> Self {
        Self {
            next: None,
            run_handler: false,
            reply: RcStatus::Ok,
        }
    }

    /// True when the decision changes the stored state
    #[inline]
    pub fn is_write(&self) -> bool {
        self.next.is_some()
    }
}

/// Decide the transition for `event` given the stored state of `tid`
pub fn decide(
    tid: &Tid,
    event: UnitEvent,
    current: Option<UnitState>,
) -> Result<Transition, UnitError> {
    use UnitState::*;

    let transition = match (event, current) {
        // check: the at-most-once gate
        (UnitEvent::Check, None) => Transition::write(Created),
        (UnitEvent::Check, Some(Created | RolledBack)) => Transition {
            next: None,
            run_handler: true,
            reply: RcStatus::Ok,
        },
        (UnitEvent::Check, Some(Executed | Committed | Confirmed)) => Transition {
            next: None,
            run_handler: false,
            reply: RcStatus::Executed,
        },

        // calls run until the unit is marked executed, then never again
        (UnitEvent::Execute, Some(Created | RolledBack)) => Transition {
            next: None,
            run_handler: true,
            reply: RcStatus::Ok,
        },
        (UnitEvent::Execute, Some(Executed)) => Transition {
            next: None,
            run_handler: false,
            reply: RcStatus::Executed,
        },

        (UnitEvent::MarkExecuted, Some(Created | RolledBack)) => Transition {
            next: Some(Executed),
            run_handler: false,
            reply: RcStatus::Ok,
        },
        (UnitEvent::MarkExecuted, Some(Executed)) => Transition::noop(),

        (UnitEvent::Commit, Some(Created | Executed | RolledBack)) => Transition::write(Committed),
        (UnitEvent::Commit, Some(Committed | Confirmed)) => Transition::noop(),

        (UnitEvent::Rollback, Some(Created | Executed)) => Transition::write(RolledBack),
        (UnitEvent::Rollback, Some(RolledBack)) => Transition::noop(),

        (UnitEvent::Confirm, Some(Committed)) => Transition::write(Confirmed),
        (UnitEvent::Confirm, Some(Confirmed)) => Transition::noop(),

        (UnitEvent::GetState, Some(_)) => Transition::noop(),
        (UnitEvent::GetState, None) => Transition {
            next: None,
            run_handler: false,
            reply: RcStatus::NotFound,
        },

        (event, state) => {
            return Err(UnitError::ProtocolViolation {
                tid: tid.to_string(),
                event,
                state,
            });
        }
    };

    Ok(transition)
}
