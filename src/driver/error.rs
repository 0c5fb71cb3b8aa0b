//! Error types for the physical driver boundary.
//!
//! Every failure raised by a physical connection or transaction travels
//! through the decorators as a `DriverError`, untouched.

use thiserror::Error;

use crate::driver::connection::ConnectionState;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by a physical connection or transaction.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The connection must be open for this operation.
    #[error("connection is not open (state: {state})")]
    NotOpen { state: ConnectionState },

    /// A physical operation failed.
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    /// The driver observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error (socket or file level).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other driver-specific failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    /// Create an operation failure.
    pub fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            operation,
            message: message.into(),
        }
    }

    /// Wrap a driver-specific error.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }

    /// Check if this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DriverError::Cancelled)
    }

    /// Check if this error means the connection itself is unusable.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            DriverError::NotOpen {
                state: ConnectionState::Broken | ConnectionState::Closed
            } | DriverError::Io(_)
        )
    }
}
