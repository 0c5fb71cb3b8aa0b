//! The physical driver boundary.
//!
//! These traits describe what the decorators need from a database driver:
//! a connection that can start one physical transaction at a time, and a
//! transaction that can commit or roll back. Both a blocking and a
//! suspending form are provided.
//!
//! ```text
//!  ConnectionScope ──wraps──▶ DbConnection ──begins──▶ DbTransaction
//!        │                                                  ▲
//!        └──owns──▶ TransactionScope ───────wraps───────────┘
//! ```

mod connection;
mod error;
mod events;
mod schema;
mod transaction;

pub use connection::{AsyncDbConnection, ConnectionState, DbConnection};
pub use error::{DriverError, DriverResult};
pub use events::{ListenerId, StateChangeEvent, StateChangeHandlers, StateChangeListener};
pub use schema::{SchemaRow, SchemaTable, METADATA_COLLECTIONS};
pub use transaction::{AsyncDbTransaction, DbTransaction};
