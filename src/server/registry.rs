//! Transaction Handler Registry
//!
//! One handler set per logical backend system. The dispatch adapter routes
//! every lifecycle phase through [`HandlerRegistry::dispatch`], which turns a
//! missing registration into `NotSupported` and a panicking handler into
//! `ExternalFailure`.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::tid::Tid;
use crate::unit::{RcStatus, ServerHandle, UnitError};

/// Lifecycle phase routed to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Check,
    Commit,
    Rollback,
    Confirm,
    GetState,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Check => "check",
            Phase::Commit => "commit",
            Phase::Rollback => "rollback",
            Phase::Confirm => "confirm",
            Phase::GetState => "get_state",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application callbacks for one backend system
///
/// Called while the dispatch adapter holds the TID's lock and before the
/// phase's state change is persisted. Returning anything but `Ok` aborts the
/// phase and leaves the stored state untouched.
pub trait TransactionHandler: Send + Sync {
    fn check(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus;

    fn commit(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus;

    fn rollback(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus;

    fn confirm(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus;

    /// Optional; the default accepts every query
    fn get_state(&self, _handle: &ServerHandle, _tid: &Tid) -> RcStatus {
        RcStatus::Ok
    }
}

/// Handler sets keyed by system id
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn TransactionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler set for `system_id`
    ///
    /// A second registration for the same system is a configuration error.
    pub fn register(
        &self,
        system_id: impl Into<String>,
        handler: Arc<dyn TransactionHandler>,
    ) -> Result<(), UnitError> {
        let system_id = system_id.into();
        match self.handlers.entry(system_id.clone()) {
            Entry::Occupied(_) => Err(UnitError::HandlerAlreadyRegistered(system_id)),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                tracing::info!(system_id = %system_id, "Transaction handler registered");
                Ok(())
            }
        }
    }

    pub fn unregister(&self, system_id: &str) -> bool {
        self.handlers.remove(system_id).is_some()
    }

    pub fn is_registered(&self, system_id: &str) -> bool {
        self.handlers.contains_key(system_id)
    }

    pub fn get(&self, system_id: &str) -> Option<Arc<dyn TransactionHandler>> {
        self.handlers.get(system_id).map(|h| Arc::clone(h.value()))
    }

    /// Run the handler for `phase` and return its code
    pub fn dispatch(
        &self,
        system_id: &str,
        phase: Phase,
        handle: &ServerHandle,
        tid: &Tid,
    ) -> RcStatus {
        // Clone out of the map so no shard lock is held while user code runs
        let Some(handler) = self.get(system_id) else {
            tracing::warn!(system_id, phase = %phase, tid = %tid, "No transaction handler configured");
            return UnitError::NotConfigured(system_id.to_string()).rc_status();
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| match phase {
            Phase::Check => handler.check(handle, tid),
            Phase::Commit => handler.commit(handle, tid),
            Phase::Rollback => handler.rollback(handle, tid),
            Phase::Confirm => handler.confirm(handle, tid),
            Phase::GetState => handler.get_state(handle, tid),
        }));

        match outcome {
            Ok(rc) => {
                if !rc.is_ok() {
                    tracing::warn!(system_id, phase = %phase, tid = %tid, rc = %rc, "Handler refused phase");
                }
                rc
            }
            Err(_) => {
                tracing::error!(system_id, phase = %phase, tid = %tid, "Transaction handler panicked");
                RcStatus::ExternalFailure
            }
        }
    }
}
