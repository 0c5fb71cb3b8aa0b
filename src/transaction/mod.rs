//! Transaction scopes.
//!
//! A transaction scope flattens nested begin calls onto one physical
//! transaction. The scope counts begins and commits; the physical
//! transaction is committed only when every begin has been matched by a
//! commit and is rolled back otherwise.
//!
//! # Lifecycle
//!
//! ```text
//!  Idle ──begin──▶ Active(begin=1) ──begin──▶ Active(begin=N)
//!                        │                          │
//!                        └────────commit/dispose────┘
//!                                     │
//!               ┌─────────────────────┴─────────────────────┐
//!               ▼                                           ▼
//!      Resolved(commit)                            Resolved(rollback)
//!   (commits == begins)                          (any other resolution)
//!               └──────────────────▶ Idle ◀─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txscope::db::ConnectionScope;
//!
//! let mut conn = ConnectionScope::new(driver_connection);
//!
//! let outer = conn.begin_transaction()?;
//! let inner = conn.begin_transaction()?; // same physical transaction
//! inner.commit()?;                       // 1 of 2
//! outer.commit()?;                       // 2 of 2: physical commit
//! ```

mod async_scope;
mod completion;
mod isolation;
mod scope;
mod state;

pub use async_scope::AsyncTransactionScope;
pub use completion::{
    AsyncCompletionBehavior, CommitCompletion, CompletionBehavior, CompletionMode,
    RollbackCompletion, ScopeOutcome,
};
pub use isolation::IsolationLevel;
pub use scope::TransactionScope;
pub use state::ScopeInfo;

pub(crate) use state::{ScopeCore, ScopeSlot};
