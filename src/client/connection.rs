//! Client connection
//!
//! Holds at most one in-flight unit. The slot is taken by `initialize_unit`
//! and released by `confirm_unit` or `destroy_unit`; every unit operation
//! needs the slot to hold that unit's TID, otherwise it fails with
//! `NoTransactionHandle`.

use std::sync::{Mutex, MutexGuard};

use super::error::ClientError;
use super::transport::UnitTransport;
use super::unit::{FunctionCall, Unit, UnitAttributes};
use crate::tid::Tid;
use crate::unit::UnitState;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveUnit {
    tid: Tid,
    submitted: bool,
}

pub struct Connection<T: UnitTransport> {
    transport: T,
    active: Mutex<Option<ActiveUnit>>,
}

impl<T: UnitTransport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            active: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// TID of the unit currently holding the slot
    pub fn active_unit(&self) -> Option<Tid> {
        self.slot().as_ref().map(|a| a.tid.clone())
    }

    /// Open a new unit with a fresh TID
    pub fn initialize_unit(&self, background: bool) -> Result<Unit, ClientError> {
        let mut slot = self.slot();
        if let Some(active) = slot.as_ref() {
            return Err(ClientError::ActiveUnitExists(active.tid.to_string()));
        }

        let unit = Unit::new(background);
        *slot = Some(ActiveUnit {
            tid: unit.tid.clone(),
            submitted: false,
        });
        tracing::debug!(tid = %unit.tid, background, "Unit initialized");
        Ok(unit)
    }

    /// Validate the payload and hand the whole unit to the transport
    ///
    /// A validation failure releases the slot and sends nothing. A transport
    /// failure keeps the unit open so it can be resubmitted or destroyed.
    pub async fn fill_and_submit_unit(
        &self,
        unit: &mut Unit,
        calls: Vec<FunctionCall>,
        queue_names: Vec<String>,
        attributes: UnitAttributes,
    ) -> Result<(), ClientError> {
        {
            let mut slot = self.slot();
            if !holds(&slot, &unit.tid) {
                return Err(ClientError::NoTransactionHandle);
            }
            if let Err(e) = unit.fill(calls, queue_names, attributes) {
                *slot = None;
                tracing::warn!(tid = %unit.tid, error = %e, "Unit rejected before submit");
                return Err(e);
            }
        }

        self.transport.submit(unit).await?;

        if let Some(active) = self.slot().as_mut().filter(|a| a.tid == unit.tid) {
            active.submitted = true;
        }
        tracing::info!(tid = %unit.tid, mode = %unit.mode(), "Unit submitted");
        Ok(())
    }

    /// Receiving side's state of a submitted unit
    pub async fn get_unit_state(&self, unit: &Unit) -> Result<UnitState, ClientError> {
        self.require_submitted(unit)?;
        self.transport.get_state(&unit.identifier()).await
    }

    /// Confirm a submitted unit and release the slot
    pub async fn confirm_unit(&self, unit: &Unit) -> Result<(), ClientError> {
        self.require_submitted(unit)?;
        self.transport.confirm(&unit.identifier()).await?;

        let mut slot = self.slot();
        if holds(&slot, &unit.tid) {
            *slot = None;
        }
        tracing::info!(tid = %unit.tid, "Unit confirmed");
        Ok(())
    }

    /// Abandon the unit locally and release the slot
    pub fn destroy_unit(&self, unit: &Unit) -> Result<(), ClientError> {
        let mut slot = self.slot();
        if !holds(&slot, &unit.tid) {
            return Err(ClientError::NoTransactionHandle);
        }
        *slot = None;
        tracing::debug!(tid = %unit.tid, "Unit destroyed");
        Ok(())
    }

    fn require_submitted(&self, unit: &Unit) -> Result<(), ClientError> {
        match self.slot().as_ref() {
            Some(active) if active.tid == unit.tid && active.submitted => Ok(()),
            _ => Err(ClientError::NoTransactionHandle),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveUnit>> {
        // Every update is a single assignment, a poisoned slot is still consistent
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn holds(slot: &Option<ActiveUnit>, tid: &Tid) -> bool {
    slot.as_ref().is_some_and(|a| &a.tid == tid)
}
