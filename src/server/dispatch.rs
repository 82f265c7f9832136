//! Inbound Dispatch Adapter
//!
//! Bridges transport events into the unit lifecycle:
//!
//! ```text
//! transport ──► lock(tid) ──► store.get ──► decide ──► handler ──► store.put ──► RcStatus
//! ```
//!
//! # Guarantees
//!
//! - Phases for one TID are serialised by a per-TID mutex; different TIDs run
//!   concurrently
//! - The stored state changes only after the handler accepted the phase, and
//!   the reply is sent only after the write is durable
//! - A store failure never reaches the handler and never answers `Ok`

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use super::functions::{FunctionRegistry, Params, RequestContext};
use super::registry::{HandlerRegistry, Phase};
use crate::store::TidStore;
use crate::tid::{Tid, UnitIdentifier};
use crate::unit::{RcStatus, ServerHandle, UnitCallType, UnitError, UnitEvent, UnitState, decide};

/// What `confirm` does with a committed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmPolicy {
    /// Keep the record as CONFIRMED
    #[default]
    Retain,
    /// Remove the record; a redelivered confirm for a missing TID answers OK
    Delete,
}

pub struct DispatchAdapter {
    store: Arc<dyn TidStore>,
    handlers: Arc<HandlerRegistry>,
    functions: Arc<FunctionRegistry>,
    confirm_policy: ConfirmPolicy,
    locks: DashMap<Tid, Arc<Mutex<()>>>,
}

impl DispatchAdapter {
    pub fn new(
        store: Arc<dyn TidStore>,
        handlers: Arc<HandlerRegistry>,
        functions: Arc<FunctionRegistry>,
        confirm_policy: ConfirmPolicy,
    ) -> Self {
        Self {
            store,
            handlers,
            functions,
            confirm_policy,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TidStore> {
        &self.store
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        self.confirm_policy
    }

    /// `Ok` means the unit may execute; `Executed` means it already did
    pub fn check(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        self.with_tid_lock(tid, || self.apply(handle, tid, UnitEvent::Check))
    }

    pub fn commit(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        self.with_tid_lock(tid, || self.apply(handle, tid, UnitEvent::Commit))
    }

    pub fn rollback(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        self.with_tid_lock(tid, || self.apply(handle, tid, UnitEvent::Rollback))
    }

    pub fn confirm(&self, handle: &ServerHandle, tid: &Tid) -> RcStatus {
        self.with_tid_lock(tid, || self.apply(handle, tid, UnitEvent::Confirm))
    }

    /// Stored state of `tid`, or the code explaining why there is none
    pub fn get_state(&self, handle: &ServerHandle, tid: &Tid) -> Result<UnitState, RcStatus> {
        self.with_tid_lock(tid, || {
            let record = match self.store.get(tid) {
                Ok(record) => record,
                Err(e) => return Err(self.store_failure(handle, tid, UnitEvent::GetState, &e)),
            };
            let Some(record) = record else {
                tracing::debug!(system_id = %handle.system_id, tid = %tid, "get_state: TID not found");
                return Err(RcStatus::NotFound);
            };

            let rc = self
                .handlers
                .dispatch(&handle.system_id, Phase::GetState, handle, tid);
            if !rc.is_ok() {
                return Err(rc);
            }
            Ok(record.status)
        })
    }

    /// Run a business function inside the unit `unit`
    ///
    /// The unit must have passed `check` and must not be executed or
    /// committed yet. When the final call of an asynchronous unit succeeds,
    /// EXECUTED is recorded with the function name as note before returning,
    /// so a redelivery that already passed `check` is refused with
    /// [`UnitError::AlreadyExecuted`]. A failing or panicking function leaves
    /// the stored state as is.
    pub fn invoke(
        &self,
        handle: &ServerHandle,
        unit: &UnitIdentifier,
        call_type: UnitCallType,
        final_call: bool,
        name: &str,
        params: Params,
    ) -> Result<Params, UnitError> {
        let tid = &unit.tid;
        self.with_tid_lock(tid, || {
            let function = self.functions.get(name)?;
            let current = self.store.get(tid)?.map(|r| r.status);
            let transition = match decide(tid, UnitEvent::Execute, current) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(
                        system_id = %handle.system_id,
                        tid = %tid,
                        function = name,
                        error = %e,
                        "Refusing function call outside an open unit"
                    );
                    return Err(e);
                }
            };
            if !transition.reply.is_ok() {
                tracing::warn!(
                    system_id = %handle.system_id,
                    tid = %tid,
                    function = name,
                    rc = %transition.reply,
                    "Refusing re-execution"
                );
                return Err(UnitError::AlreadyExecuted(tid.to_string()));
            }

            let ctx = RequestContext::for_unit(handle.clone(), unit.clone(), call_type);
            let result = run_function(name, || function.call(&ctx, params))?;

            if ctx.is_async() && final_call {
                // state cannot have moved: we still hold the TID lock
                let transition = decide(tid, UnitEvent::MarkExecuted, current)?;
                if let Some(next) = transition.next {
                    if let Err(e) = self.store.put(tid, next, Some(name)) {
                        tracing::error!(
                            tid = %tid,
                            function = name,
                            error = %e,
                            "Function ran but EXECUTED could not be recorded"
                        );
                        return Err(e);
                    }
                    tracing::info!(tid = %tid, function = name, state = %next, "Unit marked executed");
                }
            }

            tracing::debug!(tid = %tid, function = name, call_type = ?call_type, final_call, "Function call completed");
            Ok(result)
        })
    }

    /// Run a business function outside any unit
    pub fn invoke_plain(
        &self,
        handle: &ServerHandle,
        name: &str,
        params: Params,
    ) -> Result<Params, UnitError> {
        let function = self.functions.get(name)?;
        let ctx = RequestContext::plain(handle.clone());
        run_function(name, || function.call(&ctx, params))
    }

    /// Decide, run the handler, persist. Caller holds the TID lock.
    fn apply(&self, handle: &ServerHandle, tid: &Tid, event: UnitEvent) -> RcStatus {
        let system_id = handle.system_id.as_str();

        let current = match self.store.get(tid) {
            Ok(record) => record.map(|r| r.status),
            Err(e) => return self.store_failure(handle, tid, event, &e),
        };

        if event == UnitEvent::Confirm
            && current.is_none()
            && self.confirm_policy == ConfirmPolicy::Delete
        {
            tracing::debug!(system_id, tid = %tid, "Confirm for removed TID, already done");
            return RcStatus::Ok;
        }

        let transition = match decide(tid, event, current) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(system_id, tid = %tid, event = %event, error = %e, "Protocol violation");
                return e.rc_status();
            }
        };

        if !transition.reply.is_ok() {
            tracing::warn!(
                system_id,
                tid = %tid,
                event = %event,
                rc = %transition.reply,
                "Refusing re-execution"
            );
            return transition.reply;
        }

        if transition.run_handler {
            let rc = self
                .handlers
                .dispatch(system_id, phase_for(event), handle, tid);
            if !rc.is_ok() {
                return rc;
            }
        }

        let Some(next) = transition.next else {
            tracing::debug!(system_id, tid = %tid, event = %event, state = ?current, "No state change");
            return transition.reply;
        };

        let written = if next == UnitState::Confirmed && self.confirm_policy == ConfirmPolicy::Delete {
            self.store.delete(tid).map(|_| ())
        } else {
            self.store.put(tid, next, None).map(|_| ())
        };
        if let Err(e) = written {
            return self.store_failure(handle, tid, event, &e);
        }

        tracing::info!(
            system_id,
            tid = %tid,
            event = %event,
            from = ?current,
            state = %next,
            "Unit state changed"
        );
        transition.reply
    }

    /// `check` must not proceed; later phases should be redelivered
    fn store_failure(
        &self,
        handle: &ServerHandle,
        tid: &Tid,
        event: UnitEvent,
        error: &UnitError,
    ) -> RcStatus {
        tracing::error!(
            system_id = %handle.system_id,
            tid = %tid,
            event = %event,
            error = %error,
            "TID store failure"
        );
        match event {
            UnitEvent::Commit | UnitEvent::Rollback | UnitEvent::Confirm => RcStatus::Retry,
            _ => RcStatus::ExternalFailure,
        }
    }

    fn with_tid_lock<R>(&self, tid: &Tid, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(
            self.locks
                .entry(tid.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        let result = {
            // The guarded value is (), a panic elsewhere leaves nothing inconsistent
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };

        drop(lock);
        self.locks.remove_if(tid, |_, l| Arc::strong_count(l) == 1);
        result
    }

    /// Number of TIDs with an in-flight phase
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }
}

fn phase_for(event: UnitEvent) -> Phase {
    match event {
        UnitEvent::Commit => Phase::Commit,
        UnitEvent::Rollback => Phase::Rollback,
        UnitEvent::Confirm => Phase::Confirm,
        UnitEvent::GetState => Phase::GetState,
        UnitEvent::Check | UnitEvent::Execute | UnitEvent::MarkExecuted => Phase::Check,
    }
}

fn run_function(
    name: &str,
    call: impl FnOnce() -> Result<Params, String>,
) -> Result<Params, UnitError> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(reason)) => {
            tracing::warn!(function = name, reason = %reason, "Server function failed");
            Err(UnitError::FunctionFailed {
                name: name.to_string(),
                reason,
            })
        }
        Err(_) => {
            tracing::error!(function = name, "Server function panicked");
            Err(UnitError::FunctionFailed {
                name: name.to_string(),
                reason: "panicked".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::functions::ServerFunction;
    use crate::server::registry::mock::MockHandler;
    use crate::store::MemoryTidStore;
    use crate::store::mock::FlakyStore;
    use crate::tid::UnitType;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SYSTEM: &str = "MME";

    struct Fixture {
        adapter: DispatchAdapter,
        handler: Arc<MockHandler>,
        handle: ServerHandle,
    }

    fn fixture_with(store: Arc<dyn TidStore>, policy: ConfirmPolicy) -> Fixture {
        let handlers = Arc::new(HandlerRegistry::new());
        let handler = Arc::new(MockHandler::new());
        handlers.register(SYSTEM, handler.clone()).unwrap();

        let functions = Arc::new(FunctionRegistry::new());
        let echo: Arc<dyn ServerFunction> =
            Arc::new(|_: &RequestContext, p: Params| -> Result<Params, String> { Ok(p) });
        functions.add("STFC_WRITE_TO_TCPIC", echo).unwrap();
        let failing: Arc<dyn ServerFunction> =
            Arc::new(|_: &RequestContext, _: Params| -> Result<Params, String> {
                Err("posting period closed".to_string())
            });
        functions.add("Z_FAIL", failing).unwrap();
        let panicking: Arc<dyn ServerFunction> =
            Arc::new(|_: &RequestContext, _: Params| -> Result<Params, String> { panic!("boom") });
        functions.add("Z_PANIC", panicking).unwrap();

        Fixture {
            adapter: DispatchAdapter::new(store, handlers, functions, policy),
            handler,
            handle: ServerHandle::new(1, SYSTEM),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryTidStore::new()), ConfirmPolicy::Retain)
    }

    fn tid() -> Tid {
        Tid::parse(&"A".repeat(32)).unwrap()
    }

    fn unit() -> UnitIdentifier {
        UnitIdentifier::new(tid(), UnitType::Queued)
    }

    fn stored(f: &Fixture) -> Option<UnitState> {
        f.adapter.store().get(&tid()).unwrap().map(|r| r.status)
    }

    // ============================================================
    // LIFECYCLE
    // ============================================================

    #[test]
    fn test_check_creates_once() {
        let f = fixture();
        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Ok);
        let first = f.adapter.store().get(&tid()).unwrap().unwrap();
        assert_eq!(first.status, UnitState::Created);

        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Ok);
        let second = f.adapter.store().get(&tid()).unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(f.adapter.store().len().unwrap(), 1);
    }

    #[test]
    fn test_commit_confirm_then_check_refuses() {
        let f = fixture();
        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(f.adapter.commit(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(stored(&f), Some(UnitState::Committed));
        assert_eq!(f.adapter.confirm(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(stored(&f), Some(UnitState::Confirmed));

        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Executed);
        assert_eq!(f.handler.checks(), 1);
    }

    #[test]
    fn test_rollback_rearms_check() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());
        assert_eq!(f.adapter.rollback(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(stored(&f), Some(UnitState::RolledBack));

        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(f.adapter.commit(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(stored(&f), Some(UnitState::Committed));
    }

    #[test]
    fn test_repeated_confirm_is_noop() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());
        f.adapter.commit(&f.handle, &tid());
        assert_eq!(f.adapter.confirm(&f.handle, &tid()), RcStatus::Ok);
        let after_first = f.adapter.store().get(&tid()).unwrap().unwrap();

        assert_eq!(f.adapter.confirm(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(f.adapter.store().get(&tid()).unwrap().unwrap(), after_first);
        assert_eq!(f.handler.confirms(), 1);
    }

    #[test]
    fn test_phases_on_unknown_tid_are_violations() {
        let f = fixture();
        assert_eq!(f.adapter.commit(&f.handle, &tid()), RcStatus::IllegalState);
        assert_eq!(f.adapter.rollback(&f.handle, &tid()), RcStatus::IllegalState);
        assert_eq!(f.adapter.confirm(&f.handle, &tid()), RcStatus::IllegalState);
        assert!(f.adapter.store().is_empty().unwrap());
        assert_eq!(f.handler.commits(), 0);
    }

    #[test]
    fn test_get_state() {
        let f = fixture();
        assert_eq!(f.adapter.get_state(&f.handle, &tid()), Err(RcStatus::NotFound));
        f.adapter.check(&f.handle, &tid());
        assert_eq!(f.adapter.get_state(&f.handle, &tid()), Ok(UnitState::Created));
        assert_eq!(stored(&f), Some(UnitState::Created));
    }

    // ============================================================
    // HANDLER OUTCOMES
    // ============================================================

    #[test]
    fn test_refused_handler_leaves_state() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());
        f.handler.set_refuse(Phase::Commit, RcStatus::Retry);

        assert_eq!(f.adapter.commit(&f.handle, &tid()), RcStatus::Retry);
        assert_eq!(stored(&f), Some(UnitState::Created));
    }

    #[test]
    fn test_refused_check_creates_nothing() {
        let f = fixture();
        f.handler.set_refuse(Phase::Check, RcStatus::ExternalFailure);
        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::ExternalFailure);
        assert_eq!(stored(&f), None);
    }

    #[test]
    fn test_panicking_handler_leaves_state() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());
        f.handler.set_panic_on(Phase::Rollback);

        assert_eq!(f.adapter.rollback(&f.handle, &tid()), RcStatus::ExternalFailure);
        assert_eq!(stored(&f), Some(UnitState::Created));
        assert_eq!(f.adapter.active_locks(), 0);
    }

    #[test]
    fn test_unconfigured_system() {
        let f = fixture();
        let other = ServerHandle::new(2, "QM7");
        assert_eq!(f.adapter.check(&other, &tid()), RcStatus::NotSupported);
        assert_eq!(stored(&f), None);

        // a stored record is not reported to an unconfigured system either
        f.adapter.check(&f.handle, &tid());
        assert_eq!(f.adapter.get_state(&other, &tid()), Err(RcStatus::NotSupported));
        assert_eq!(f.adapter.get_state(&f.handle, &tid()), Ok(UnitState::Created));
    }

    // ============================================================
    // STORE FAILURES
    // ============================================================

    #[test]
    fn test_store_read_failure_blocks_handler() {
        let store = Arc::new(FlakyStore::new());
        let f = fixture_with(store.clone(), ConfirmPolicy::Retain);
        store.set_fail_reads(true);

        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::ExternalFailure);
        assert_eq!(f.adapter.commit(&f.handle, &tid()), RcStatus::Retry);
        assert_eq!(f.handler.checks(), 0);
        assert_eq!(f.handler.commits(), 0);
    }

    #[test]
    fn test_store_write_failure_never_answers_ok() {
        let store = Arc::new(FlakyStore::new());
        let f = fixture_with(store.clone(), ConfirmPolicy::Retain);

        store.set_fail_writes(true);
        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::ExternalFailure);

        store.set_fail_writes(false);
        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Ok);

        store.set_fail_writes(true);
        assert_eq!(f.adapter.commit(&f.handle, &tid()), RcStatus::Retry);
        store.set_fail_writes(false);
        assert_eq!(
            store.get(&tid()).unwrap().map(|r| r.status),
            Some(UnitState::Created)
        );
    }

    // ============================================================
    // CONFIRM POLICY
    // ============================================================

    #[test]
    fn test_confirm_delete_policy() {
        let f = fixture_with(Arc::new(MemoryTidStore::new()), ConfirmPolicy::Delete);
        f.adapter.check(&f.handle, &tid());
        f.adapter.commit(&f.handle, &tid());
        assert_eq!(f.adapter.confirm(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(stored(&f), None);

        // redelivered confirm
        assert_eq!(f.adapter.confirm(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(f.handler.confirms(), 1);
    }

    // ============================================================
    // FUNCTION CALLS
    // ============================================================

    fn params() -> Params {
        let mut p = Params::new();
        p.insert("TCPICDAT".into(), json!(["line 1", "line 2"]));
        p
    }

    #[test]
    fn test_async_invoke_marks_executed() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());

        let result = f
            .adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, "STFC_WRITE_TO_TCPIC", params())
            .unwrap();
        assert_eq!(result, params());

        let record = f.adapter.store().get(&tid()).unwrap().unwrap();
        assert_eq!(record.status, UnitState::Executed);
        assert_eq!(record.note.as_deref(), Some("STFC_WRITE_TO_TCPIC"));

        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Executed);
    }

    #[test]
    fn test_multi_call_unit_marks_after_final_call() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());

        f.adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, false, "STFC_WRITE_TO_TCPIC", params())
            .unwrap();
        assert_eq!(stored(&f), Some(UnitState::Created));

        f.adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, "STFC_WRITE_TO_TCPIC", params())
            .unwrap();
        assert_eq!(stored(&f), Some(UnitState::Executed));
    }

    #[test]
    fn test_interleaved_redelivery_runs_function_once() {
        let f = fixture();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let post: Arc<dyn ServerFunction> =
            Arc::new(move |_: &RequestContext, p: Params| -> Result<Params, String> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(p)
            });
        f.adapter.functions().add("BAPI_ACC_DOCUMENT_POST", post).unwrap();

        // both deliveries pass check before either runs its call
        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Ok);
        assert_eq!(f.adapter.check(&f.handle, &tid()), RcStatus::Ok);

        f.adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, "BAPI_ACC_DOCUMENT_POST", params())
            .unwrap();
        let err = f
            .adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, "BAPI_ACC_DOCUMENT_POST", params())
            .unwrap_err();
        assert_eq!(err, UnitError::AlreadyExecuted(tid().to_string()));
        assert_eq!(err.rc_status(), RcStatus::Executed);

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(stored(&f), Some(UnitState::Executed));
    }

    #[test]
    fn test_sync_invoke_leaves_created() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());
        f.adapter
            .invoke(&f.handle, &unit(), UnitCallType::Synchronous, true, "STFC_WRITE_TO_TCPIC", params())
            .unwrap();
        assert_eq!(stored(&f), Some(UnitState::Created));
    }

    #[test]
    fn test_invoke_requires_check() {
        let f = fixture();
        let err = f
            .adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, "STFC_WRITE_TO_TCPIC", params())
            .unwrap_err();
        assert!(matches!(err, UnitError::ProtocolViolation { .. }));

        f.adapter.check(&f.handle, &tid());
        f.adapter.commit(&f.handle, &tid());
        let err = f
            .adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, "STFC_WRITE_TO_TCPIC", params())
            .unwrap_err();
        assert!(matches!(err, UnitError::ProtocolViolation { .. }));
    }

    #[test]
    fn test_failing_function_leaves_state() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());

        for name in ["Z_FAIL", "Z_PANIC"] {
            let err = f
                .adapter
                .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, name, params())
                .unwrap_err();
            assert!(matches!(err, UnitError::FunctionFailed { .. }));
            assert_eq!(err.rc_status(), RcStatus::ExternalFailure);
            assert_eq!(stored(&f), Some(UnitState::Created));
        }
    }

    #[test]
    fn test_unknown_function() {
        let f = fixture();
        f.adapter.check(&f.handle, &tid());
        let err = f
            .adapter
            .invoke(&f.handle, &unit(), UnitCallType::Asynchronous, true, "Z_MISSING", params())
            .unwrap_err();
        assert_eq!(err, UnitError::FunctionNotFound("Z_MISSING".into()));
    }

    #[test]
    fn test_invoke_plain() {
        let f = fixture();
        let result = f
            .adapter
            .invoke_plain(&f.handle, "STFC_WRITE_TO_TCPIC", params())
            .unwrap();
        assert_eq!(result, params());
        assert!(f.adapter.store().is_empty().unwrap());
    }

    // ============================================================
    // CONCURRENCY
    // ============================================================

    #[test]
    fn test_concurrent_checks_create_one_record() {
        let f = Arc::new(fixture());
        let ok = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let f = Arc::clone(&f);
                let ok = Arc::clone(&ok);
                std::thread::spawn(move || {
                    if f.adapter.check(&f.handle, &tid()) == RcStatus::Ok {
                        ok.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(ok.load(Ordering::SeqCst), 16);
        assert_eq!(f.adapter.store().len().unwrap(), 1);
        assert_eq!(stored(&f), Some(UnitState::Created));
        assert_eq!(f.adapter.active_locks(), 0);
    }
}
