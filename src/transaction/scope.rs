//! The blocking transaction scope.

use std::sync::Arc;

use tracing::debug;
use ulid::Ulid;

use crate::driver::{DbTransaction, DriverResult};
use crate::transaction::completion::{CompletionBehavior, ScopeOutcome};
use crate::transaction::isolation::IsolationLevel;
use crate::transaction::state::{ScopeCore, ScopeInfo};

type SyncCore<T> = ScopeCore<T, dyn CompletionBehavior>;

/// A handle to the single physical transaction of a connection scope.
///
/// Every begin call on the connection returns a handle to the same scope.
/// The physical transaction is committed once the number of commits matches
/// the number of begins; otherwise it is rolled back when the connection is
/// disposed. Handles are cheap to clone and dropping one has no effect on
/// the physical transaction.
pub struct TransactionScope<T: DbTransaction> {
    core: Arc<SyncCore<T>>,
}

impl<T: DbTransaction> TransactionScope<T> {
    pub(crate) fn from_core(core: Arc<SyncCore<T>>) -> Self {
        Self { core }
    }

    /// Get the scope ID.
    pub fn id(&self) -> Ulid {
        self.core.id()
    }

    /// Get the ID of the connection scope this transaction belongs to.
    pub fn connection_id(&self) -> Ulid {
        self.core.connection_id()
    }

    /// Get the isolation level of the physical transaction.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.core
            .with_transaction(|tx| tx.isolation_level())
            .unwrap_or_else(|| self.core.started_isolation())
    }

    pub fn begin_count(&self) -> usize {
        self.core.begin_count()
    }

    pub fn commit_count(&self) -> usize {
        self.core.commit_count()
    }

    /// Check if the physical transaction has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.core.is_resolved()
    }

    /// Get a snapshot of this scope.
    pub fn info(&self) -> ScopeInfo {
        self.core.info()
    }

    /// Commit this nesting level.
    ///
    /// With a behavior that completes on commit, the commit that matches the
    /// last outstanding begin resolves the physical transaction immediately.
    pub fn commit(&self) -> DriverResult<()> {
        let balanced = self.core.record_commit();
        if balanced && self.core.completion().completes_on_commit() {
            self.complete()?;
        }
        Ok(())
    }

    /// Roll back this nesting level.
    ///
    /// Does nothing immediately: an unmatched begin already guarantees a
    /// physical rollback when the connection scope is disposed.
    pub fn rollback(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Release this handle. The physical transaction is untouched.
    pub fn dispose(self) {}

    /// Resolve the physical transaction.
    ///
    /// Balanced scopes are handed to the completion behavior, unbalanced ones
    /// are rolled back. The physical transaction is released and the
    /// connection's slot cleared even when the driver call fails.
    pub(crate) fn complete(&self) -> DriverResult<()> {
        let Some(resolution) = self.core.take() else {
            return Ok(());
        };
        let mut finish = self.core.finish_guard();
        let mut transaction = resolution.transaction;

        let result = if resolution.balanced {
            self.core.completion().complete(&mut transaction)
        } else {
            transaction
                .rollback()
                .map(|()| ScopeOutcome::RolledBack)
        };
        drop(transaction);

        debug!(
            scope = %self.core.id(),
            connection = %self.core.connection_id(),
            begins = resolution.begin_count,
            commits = resolution.commit_count,
            behavior = self.core.completion().name(),
            outcome = ?result.as_ref().ok(),
            "transaction scope resolved"
        );

        finish.set_outcome(result.as_ref().ok().copied());
        drop(finish);
        result.map(|_| ())
    }
}

impl<T: DbTransaction> DbTransaction for TransactionScope<T> {
    fn isolation_level(&self) -> IsolationLevel {
        TransactionScope::isolation_level(self)
    }

    fn commit(&mut self) -> DriverResult<()> {
        TransactionScope::commit(self)
    }

    fn rollback(&mut self) -> DriverResult<()> {
        TransactionScope::rollback(self)
    }
}

impl<T: DbTransaction> Clone for TransactionScope<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: DbTransaction> std::fmt::Debug for TransactionScope<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.core.id())
            .field("begin_count", &self.begin_count())
            .field("commit_count", &self.commit_count())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
