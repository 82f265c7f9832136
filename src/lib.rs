//! unitlog - At-most-once transactional units
//!
//! TID lifecycle for tRFC/qRFC/bgRFC style delivery: a sender bundles calls
//! into a unit named by a TID, and the receiving side executes it at most
//! once no matter how often the transport redelivers.
//!
//! # Modules
//!
//! - [`tid`] - Transaction IDs (24/32 chars) and unit identifiers
//! - [`unit`] - Unit states, return codes, errors and the transition table
//! - [`store`] - Durable TID store (WAL + snapshot) and text interchange format
//! - [`server`] - Handler registry, business functions, inbound dispatch adapter
//! - [`client`] - Unit builder and connection
//! - [`config`] / [`logging`] - YAML configuration and tracing setup

pub mod client;
pub mod config;
pub mod logging;
pub mod server;
pub mod store;
pub mod tid;
pub mod unit;

// Convenient re-exports at crate root
pub use client::{ClientError, Connection, FunctionCall, LoopbackTransport, Unit, UnitTransport};
pub use server::{
    ConfirmPolicy, DispatchAdapter, FunctionRegistry, HandlerRegistry, TransactionHandler,
};
pub use store::{FileTidStore, MemoryTidStore, TidStore};
pub use tid::{Tid, UnitIdentifier, UnitType};
pub use unit::{RcStatus, ServerHandle, UnitCallType, UnitError, UnitRecord, UnitState};
