//! Transaction isolation levels.
//!
//! Only the isolation level passed to the first begin of a scope reaches the
//! driver. Nested begins reuse the live physical transaction and their
//! requested level is ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Let the driver choose its default level.
    #[default]
    Unspecified,

    /// Pending changes from more highly isolated transactions cannot be
    /// overwritten.
    Chaos,

    /// Dirty reads are possible.
    ReadUncommitted,

    /// Each read sees the most recently committed data at the time of the
    /// read. Non-repeatable reads are possible.
    ReadCommitted,

    /// Rows read by the transaction are locked against updates until it
    /// ends. Phantom rows are possible.
    RepeatableRead,

    /// Range locks prevent other transactions from inserting into ranges
    /// this transaction has read.
    Serializable,

    /// All reads see a consistent snapshot taken at transaction start.
    Snapshot,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::Unspecified => write!(f, "UNSPECIFIED"),
            IsolationLevel::Chaos => write!(f, "CHAOS"),
            IsolationLevel::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
            IsolationLevel::Snapshot => write!(f, "SNAPSHOT"),
        }
    }
}

/// Parse isolation level from string (SQL syntax).
impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "UNSPECIFIED" | "" => Ok(IsolationLevel::Unspecified),
            "CHAOS" => Ok(IsolationLevel::Chaos),
            "READ UNCOMMITTED" | "READ_UNCOMMITTED" | "READUNCOMMITTED" => {
                Ok(IsolationLevel::ReadUncommitted)
            }
            "READ COMMITTED" | "READ_COMMITTED" | "READCOMMITTED" => {
                Ok(IsolationLevel::ReadCommitted)
            }
            "REPEATABLE READ" | "REPEATABLE_READ" | "REPEATABLEREAD" => {
                Ok(IsolationLevel::RepeatableRead)
            }
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            "SNAPSHOT" => Ok(IsolationLevel::Snapshot),
            _ => Err(format!("unknown isolation level: {}", s)),
        }
    }
}
