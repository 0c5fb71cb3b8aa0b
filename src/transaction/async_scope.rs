//! The asynchronous transaction scope.
//!
//! Mirrors [`TransactionScope`](crate::transaction::TransactionScope) with
//! suspending commit and completion. The scope lock is never held across an
//! `.await`: the physical transaction is taken out of the scope before it is
//! resolved.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use ulid::Ulid;

use crate::driver::{AsyncDbTransaction, DriverResult};
use crate::transaction::completion::{AsyncCompletionBehavior, ScopeOutcome};
use crate::transaction::isolation::IsolationLevel;
use crate::transaction::state::{ScopeCore, ScopeInfo};

type AsyncCore<T> = ScopeCore<T, dyn AsyncCompletionBehavior>;

/// A handle to the single physical transaction of an async connection scope.
pub struct AsyncTransactionScope<T: AsyncDbTransaction> {
    core: Arc<AsyncCore<T>>,
}

impl<T: AsyncDbTransaction> AsyncTransactionScope<T> {
    pub(crate) fn from_core(core: Arc<AsyncCore<T>>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> Ulid {
        self.core.id()
    }

    pub fn connection_id(&self) -> Ulid {
        self.core.connection_id()
    }

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

    pub fn is_resolved(&self) -> bool {
        self.core.is_resolved()
    }

    pub fn info(&self) -> ScopeInfo {
        self.core.info()
    }

    /// Commit this nesting level, resolving the physical transaction when it
    /// matches the last outstanding begin.
    pub async fn commit(&self, cancel: &CancellationToken) -> DriverResult<()> {
        let balanced = self.core.record_commit();
        if balanced && self.core.completion().completes_on_commit() {
            self.complete(cancel).await?;
        }
        Ok(())
    }

    /// Roll back this nesting level. Takes effect only when the connection
    /// scope is disposed.
    pub async fn rollback(&self, _cancel: &CancellationToken) -> DriverResult<()> {
        Ok(())
    }

    /// Release this handle. The physical transaction is untouched.
    pub async fn dispose(self) {}

    pub(crate) async fn complete(&self, cancel: &CancellationToken) -> DriverResult<()> {
        let Some(resolution) = self.core.take() else {
            return Ok(());
        };
        let mut finish = self.core.finish_guard();
        let mut transaction = resolution.transaction;

        let result = if resolution.balanced {
            self.core
                .completion()
                .complete(&mut transaction, cancel)
                .await
        } else {
            transaction
                .rollback(cancel)
                .await
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

    /// Release the physical transaction without resolving it.
    ///
    /// Used when an async connection scope is dropped without being disposed
    /// and nothing can be awaited; the driver's drop semantics apply.
    pub(crate) fn abandon(&self) -> bool {
        let Some(resolution) = self.core.take() else {
            return false;
        };
        drop(resolution.transaction);
        self.core.finish(None);
        true
    }
}

#[async_trait]
impl<T: AsyncDbTransaction> AsyncDbTransaction for AsyncTransactionScope<T> {
    fn isolation_level(&self) -> IsolationLevel {
        AsyncTransactionScope::isolation_level(self)
    }

    async fn commit(&mut self, cancel: &CancellationToken) -> DriverResult<()> {
        AsyncTransactionScope::commit(self, cancel).await
    }

    async fn rollback(&mut self, cancel: &CancellationToken) -> DriverResult<()> {
        AsyncTransactionScope::rollback(self, cancel).await
    }
}

impl<T: AsyncDbTransaction> Clone for AsyncTransactionScope<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: AsyncDbTransaction> std::fmt::Debug for AsyncTransactionScope<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTransactionScope")
            .field("id", &self.core.id())
            .field("begin_count", &self.begin_count())
            .field("commit_count", &self.commit_count())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
