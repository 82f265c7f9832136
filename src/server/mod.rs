//! Receiving side
//!
//! - [`registry`] - per-system transaction handlers (check/commit/rollback/confirm/get-state)
//! - [`functions`] - business functions run inside a unit
//! - [`dispatch`] - the inbound adapter the transport calls for every phase
//! - [`worker`] - background purge of old CONFIRMED records

pub mod dispatch;
pub mod functions;
pub mod registry;
pub mod worker;

pub use dispatch::{ConfirmPolicy, DispatchAdapter};
pub use functions::{FunctionRegistry, Params, RequestContext, ServerFunction};
pub use registry::{HandlerRegistry, Phase, TransactionHandler};
pub use worker::{RetentionConfig, RetentionWorker};
