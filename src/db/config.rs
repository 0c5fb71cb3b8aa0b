//! Connection scope configuration.

use serde::{Deserialize, Serialize};

use crate::transaction::{CompletionMode, IsolationLevel};

/// Connection scope configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionScopeConfig {
    /// What happens to a transaction once every nested scope committed.
    pub completion: CompletionMode,
    /// Isolation level used by `begin_transaction` without an explicit level.
    pub default_isolation: IsolationLevel,
}

impl ConnectionScopeConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the completion mode.
    pub fn completion(mut self, mode: CompletionMode) -> Self {
        self.completion = mode;
        self
    }

    /// Set the default isolation level.
    pub fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = level;
        self
    }

    /// Configuration for connections that never commit.
    pub fn dry_run() -> Self {
        Self::new().completion(CompletionMode::Rollback)
    }
}
