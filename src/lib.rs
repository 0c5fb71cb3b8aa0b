//! txscope - flattened transaction scopes
//!
//! Nested units of work that share one database connection often each call
//! "begin transaction", while the driver allows only one physical
//! transaction per connection. This crate decorates the connection so that
//! nested begins share a single physical transaction, which is committed
//! only once every begin has been matched by a commit and rolled back
//! otherwise.
//!
//! # Example
//!
//! ```ignore
//! use txscope::db::ConnectionScope;
//! use txscope::driver::DbConnection;
//!
//! let mut conn = ConnectionScope::new(driver_connection);
//! conn.open()?;
//!
//! let outer = conn.begin_transaction()?;
//! {
//!     let inner = conn.begin_transaction()?; // reuses the outer transaction
//!     inner.commit()?;
//! }
//! outer.commit()?; // physical commit happens here
//!
//! conn.dispose()?; // would roll back if a commit were missing
//! ```
//!
//! [`ConnectionScope`](db::ConnectionScope) implements
//! [`DbConnection`](driver::DbConnection) itself, so code written against the
//! driver traits accepts it unchanged.

pub mod db;
pub mod driver;
pub mod transaction;

#[cfg(test)]
mod testing;
