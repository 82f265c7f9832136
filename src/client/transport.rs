//! Unit transport
//!
//! The seam between the client connection and whatever carries units to the
//! receiving side. `LoopbackTransport` delivers in-process to a
//! [`DispatchAdapter`], driving the phases the way a remote transport would.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::ClientError;
use super::unit::Unit;
use crate::server::DispatchAdapter;
use crate::tid::UnitIdentifier;
use crate::unit::{RcStatus, ServerHandle, UnitCallType, UnitError, UnitState};

/// Transport for submitted units
///
/// `submit` must be safe to repeat for the same TID: the receiving side's
/// `check` decides whether anything runs.
#[async_trait]
pub trait UnitTransport: Send + Sync {
    /// Deliver the whole unit
    async fn submit(&self, unit: &Unit) -> Result<(), ClientError>;

    /// Query the receiving side's stored state
    async fn get_state(&self, unit: &UnitIdentifier) -> Result<UnitState, ClientError>;

    /// Tell the receiving side the unit is finished
    async fn confirm(&self, unit: &UnitIdentifier) -> Result<(), ClientError>;
}

/// In-process transport over a dispatch adapter
pub struct LoopbackTransport {
    adapter: Arc<DispatchAdapter>,
    handle: ServerHandle,
}

impl LoopbackTransport {
    pub fn new(adapter: Arc<DispatchAdapter>, handle: ServerHandle) -> Self {
        Self { adapter, handle }
    }

    pub fn adapter(&self) -> &Arc<DispatchAdapter> {
        &self.adapter
    }

    /// Run a blocking adapter call off the async runtime
    async fn blocking<R, F>(&self, f: F) -> Result<R, ClientError>
    where
        R: Send + 'static,
        F: FnOnce(&DispatchAdapter, &ServerHandle) -> R + Send + 'static,
    {
        let adapter = Arc::clone(&self.adapter);
        let handle = self.handle.clone();
        tokio::task::spawn_blocking(move || f(&*adapter, &handle))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

/// check → every call → commit, rolling back when a call fails
fn deliver(adapter: &DispatchAdapter, handle: &ServerHandle, unit: &Unit) -> Result<(), ClientError> {
    let tid = &unit.tid;
    match adapter.check(handle, tid) {
        RcStatus::Ok => {}
        RcStatus::Executed => {
            tracing::debug!(tid = %tid, "Unit already executed, nothing to deliver");
            return Ok(());
        }
        rc => return Err(ClientError::remote("check", rc, format!("TID {}", tid))),
    }

    let identifier = unit.identifier();
    let last = unit.calls.len().saturating_sub(1);
    for (i, call) in unit.calls.iter().enumerate() {
        let outcome = adapter.invoke(
            handle,
            &identifier,
            UnitCallType::Asynchronous,
            i == last,
            &call.name,
            call.params.clone(),
        );
        if let Err(UnitError::AlreadyExecuted(_)) = outcome {
            // a concurrent delivery of the same unit got there first
            tracing::debug!(tid = %tid, function = %call.name, "Unit executed by another delivery");
            return Ok(());
        }
        if let Err(e) = outcome {
            let rc = adapter.rollback(handle, tid);
            tracing::warn!(tid = %tid, function = %call.name, rollback = %rc, error = %e, "Unit call failed");
            return Err(ClientError::remote("invoke", e.rc_status(), e.to_string()));
        }
    }

    match adapter.commit(handle, tid) {
        RcStatus::Ok => {
            tracing::info!(tid = %tid, mode = %unit.mode(), calls = unit.calls.len(), "Unit delivered");
            Ok(())
        }
        rc => Err(ClientError::remote("commit", rc, format!("TID {}", tid))),
    }
}

#[async_trait]
impl UnitTransport for LoopbackTransport {
    async fn submit(&self, unit: &Unit) -> Result<(), ClientError> {
        let unit = unit.clone();
        self.blocking(move |adapter, handle| deliver(adapter, handle, &unit))
            .await?
    }

    async fn get_state(&self, unit: &UnitIdentifier) -> Result<UnitState, ClientError> {
        let tid = unit.tid.clone();
        self.blocking(move |adapter, handle| {
            adapter
                .get_state(handle, &tid)
                .map_err(|rc| ClientError::remote("get_state", rc, format!("TID {}", tid)))
        })
        .await?
    }

    async fn confirm(&self, unit: &UnitIdentifier) -> Result<(), ClientError> {
        let tid = unit.tid.clone();
        self.blocking(move |adapter, handle| match adapter.confirm(handle, &tid) {
            RcStatus::Ok => Ok(()),
            rc => Err(ClientError::remote("confirm", rc, format!("TID {}", tid))),
        })
        .await?
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::unit::{FunctionCall, UnitAttributes};
    use crate::server::{
        ConfirmPolicy, FunctionRegistry, HandlerRegistry, Params, RequestContext, ServerFunction,
    };
    use crate::server::registry::mock::MockHandler;
    use crate::store::{MemoryTidStore, TidStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn loopback(counter: Arc<AtomicUsize>) -> (LoopbackTransport, Arc<MockHandler>) {
        let handlers = Arc::new(HandlerRegistry::new());
        let handler = Arc::new(MockHandler::new());
        handlers.register("MME", handler.clone()).unwrap();

        let functions = Arc::new(FunctionRegistry::new());
        let counting: Arc<dyn ServerFunction> =
            Arc::new(move |_: &RequestContext, p: Params| -> Result<Params, String> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(p)
            });
        functions.add("STFC_WRITE_TO_TCPIC", counting).unwrap();
        let failing: Arc<dyn ServerFunction> =
            Arc::new(|_: &RequestContext, _: Params| -> Result<Params, String> {
                Err("lock conflict".into())
            });
        functions.add("Z_FAIL", failing).unwrap();

        let adapter = Arc::new(DispatchAdapter::new(
            Arc::new(MemoryTidStore::new()),
            handlers,
            functions,
            ConfirmPolicy::Retain,
        ));
        (
            LoopbackTransport::new(adapter, ServerHandle::new(1, "MME")),
            handler,
        )
    }

    fn unit_with(names: &[&str]) -> Unit {
        let mut unit = Unit::new(true);
        let calls = names
            .iter()
            .map(|n| FunctionCall::new(*n, Params::new()))
            .collect();
        unit.fill(calls, Vec::new(), UnitAttributes::new()).unwrap();
        unit
    }

    #[tokio::test]
    async fn test_submit_runs_calls_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (transport, handler) = loopback(counter.clone());
        let unit = unit_with(&["STFC_WRITE_TO_TCPIC", "STFC_WRITE_TO_TCPIC"]);

        transport.submit(&unit).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(
            transport.get_state(&unit.identifier()).await.unwrap(),
            UnitState::Committed
        );

        // redelivery of the same unit runs nothing
        transport.submit(&unit).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(handler.commits(), 1);

        transport.confirm(&unit.identifier()).await.unwrap();
        assert_eq!(
            transport.get_state(&unit.identifier()).await.unwrap(),
            UnitState::Confirmed
        );
    }

    #[tokio::test]
    async fn test_failed_call_rolls_back() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (transport, handler) = loopback(counter.clone());
        let unit = unit_with(&["STFC_WRITE_TO_TCPIC", "Z_FAIL"]);

        let err = transport.submit(&unit).await.unwrap_err();
        assert_eq!(err.rc(), Some(RcStatus::ExternalFailure));
        assert_eq!(handler.rollbacks(), 1);
        assert_eq!(
            transport.get_state(&unit.identifier()).await.unwrap(),
            UnitState::RolledBack
        );
        assert!(transport.adapter().store().contains(&unit.tid).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_tid_state() {
        let (transport, _) = loopback(Arc::new(AtomicUsize::new(0)));
        let unit = Unit::new(true);
        let err = transport.get_state(&unit.identifier()).await.unwrap_err();
        assert_eq!(err.rc(), Some(RcStatus::NotFound));
    }
}
