//! Completion behaviors.
//!
//! A completion behavior decides what happens to the physical transaction
//! once every nested scope has committed. It is chosen once per connection
//! scope and shared by every transaction scope that connection creates.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::driver::{AsyncDbTransaction, DbTransaction, DriverResult};

/// How a physical transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeOutcome {
    Committed,
    RolledBack,
}

/// Terminal action for a balanced transaction scope.
pub trait CompletionBehavior: Send + Sync {
    /// Resolve the physical transaction.
    fn complete(&self, transaction: &mut dyn DbTransaction) -> DriverResult<ScopeOutcome>;

    /// Whether the last matching commit resolves the scope immediately
    /// instead of waiting for the connection to be disposed.
    fn completes_on_commit(&self) -> bool {
        false
    }

    /// Name used in log output.
    fn name(&self) -> &'static str;
}

/// Terminal action for a balanced asynchronous transaction scope.
#[async_trait]
pub trait AsyncCompletionBehavior: Send + Sync {
    async fn complete(
        &self,
        transaction: &mut dyn AsyncDbTransaction,
        cancel: &CancellationToken,
    ) -> DriverResult<ScopeOutcome>;

    fn completes_on_commit(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Commits the physical transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitCompletion;

impl CompletionBehavior for CommitCompletion {
    fn complete(&self, transaction: &mut dyn DbTransaction) -> DriverResult<ScopeOutcome> {
        transaction.commit()?;
        Ok(ScopeOutcome::Committed)
    }

    fn completes_on_commit(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "commit"
    }
}

#[async_trait]
impl AsyncCompletionBehavior for CommitCompletion {
    async fn complete(
        &self,
        transaction: &mut dyn AsyncDbTransaction,
        cancel: &CancellationToken,
    ) -> DriverResult<ScopeOutcome> {
        transaction.commit(cancel).await?;
        Ok(ScopeOutcome::Committed)
    }

    fn completes_on_commit(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "commit"
    }
}

/// Rolls the physical transaction back even when every scope committed.
///
/// Useful for dry runs: the unit of work executes in full but leaves no
/// trace in the database.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackCompletion;

impl CompletionBehavior for RollbackCompletion {
    fn complete(&self, transaction: &mut dyn DbTransaction) -> DriverResult<ScopeOutcome> {
        transaction.rollback()?;
        Ok(ScopeOutcome::RolledBack)
    }

    fn name(&self) -> &'static str {
        "rollback"
    }
}

#[async_trait]
impl AsyncCompletionBehavior for RollbackCompletion {
    async fn complete(
        &self,
        transaction: &mut dyn AsyncDbTransaction,
        cancel: &CancellationToken,
    ) -> DriverResult<ScopeOutcome> {
        transaction.rollback(cancel).await?;
        Ok(ScopeOutcome::RolledBack)
    }

    fn name(&self) -> &'static str {
        "rollback"
    }
}

/// Built-in completion behavior, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    #[default]
    Commit,
    Rollback,
}

impl CompletionMode {
    /// Get the blocking behavior for this mode.
    pub fn behavior(&self) -> Arc<dyn CompletionBehavior> {
        match self {
            CompletionMode::Commit => Arc::new(CommitCompletion),
            CompletionMode::Rollback => Arc::new(RollbackCompletion),
        }
    }

    /// Get the asynchronous behavior for this mode.
    pub fn async_behavior(&self) -> Arc<dyn AsyncCompletionBehavior> {
        match self {
            CompletionMode::Commit => Arc::new(CommitCompletion),
            CompletionMode::Rollback => Arc::new(RollbackCompletion),
        }
    }
}

impl fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionMode::Commit => write!(f, "commit"),
            CompletionMode::Rollback => write!(f, "rollback"),
        }
    }
}

impl std::str::FromStr for CompletionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "commit" => Ok(CompletionMode::Commit),
            "rollback" | "dry-run" | "dry_run" => Ok(CompletionMode::Rollback),
            _ => Err(format!("unknown completion mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, Journal, MockTransaction};
    use crate::transaction::IsolationLevel;

    #[test]
    fn test_commit_completion_commits() {
        let journal = Journal::new();
        let mut tx = MockTransaction::new(&journal, IsolationLevel::Unspecified);

        let outcome = CompletionBehavior::complete(&CommitCompletion, &mut tx).unwrap();
        assert_eq!(outcome, ScopeOutcome::Committed);
        assert_eq!(journal.commits(), 1);
        assert_eq!(journal.rollbacks(), 0);
        assert!(CompletionBehavior::completes_on_commit(&CommitCompletion));
    }

    #[test]
    fn test_rollback_completion_rolls_back() {
        let journal = Journal::new();
        let mut tx = MockTransaction::new(&journal, IsolationLevel::Unspecified);

        let outcome = CompletionBehavior::complete(&RollbackCompletion, &mut tx).unwrap();
        assert_eq!(outcome, ScopeOutcome::RolledBack);
        assert_eq!(journal.commits(), 0);
        assert_eq!(journal.rollbacks(), 1);
        assert!(!CompletionBehavior::completes_on_commit(&RollbackCompletion));
    }

    #[test]
    fn test_commit_failure_propagates() {
        let journal = Journal::new();
        journal.fail_commits(true);
        let mut tx = MockTransaction::new(&journal, IsolationLevel::Unspecified);

        let err = CompletionBehavior::complete(&CommitCompletion, &mut tx).unwrap_err();
        assert_eq!(err.to_string(), "commit failed: simulated failure");
    }

    #[tokio::test]
    async fn test_async_behaviors_pass_token() {
        let journal = Journal::new();
        let cancel = CancellationToken::new();

        let mut tx = MockTransaction::new(&journal, IsolationLevel::Unspecified);
        let outcome = AsyncCompletionBehavior::complete(&CommitCompletion, &mut tx, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, ScopeOutcome::Committed);

        cancel.cancel();
        let mut tx = MockTransaction::new(&journal, IsolationLevel::Unspecified);
        let err = AsyncCompletionBehavior::complete(&RollbackCompletion, &mut tx, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(journal.count(|call| matches!(call, Call::Rollback(_))), 1);
    }

    #[test]
    fn test_parse_completion_mode() {
        assert_eq!("Commit".parse::<CompletionMode>().unwrap(), CompletionMode::Commit);
        assert_eq!("dry-run".parse::<CompletionMode>().unwrap(), CompletionMode::Rollback);
        assert!("abort".parse::<CompletionMode>().is_err());
        assert_eq!(CompletionMode::Rollback.to_string(), "rollback");
    }

    #[test]
    fn test_mode_selects_behavior() {
        assert_eq!(CompletionMode::Commit.behavior().name(), "commit");
        assert_eq!(CompletionMode::Rollback.async_behavior().name(), "rollback");
    }
}
