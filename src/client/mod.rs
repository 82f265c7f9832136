//! Sending side
//!
//! Builds units, submits them through a [`UnitTransport`], and follows them
//! to confirmation.
//!
//! ```text
//! initialize_unit ──► fill_and_submit_unit ──► get_unit_state ──► confirm_unit
//!        │                                                  └──► destroy_unit
//! ```

pub mod connection;
pub mod error;
pub mod transport;
pub mod unit;

pub use connection::Connection;
pub use error::ClientError;
pub use transport::{LoopbackTransport, UnitTransport};
pub use unit::{DeliveryMode, FunctionCall, Unit, UnitAttributes};
