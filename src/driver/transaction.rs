//! Physical transaction capability traits.
//!
//! A physical transaction is released by dropping it; drivers that need to
//! clean up do so in `Drop`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::error::DriverResult;
use crate::transaction::IsolationLevel;

/// A blocking physical transaction.
pub trait DbTransaction: Send {
    fn isolation_level(&self) -> IsolationLevel;
    fn commit(&mut self) -> DriverResult<()>;
    fn rollback(&mut self) -> DriverResult<()>;
}

/// A physical transaction with suspending I/O.
#[async_trait]
pub trait AsyncDbTransaction: Send {
    fn isolation_level(&self) -> IsolationLevel;
    async fn commit(&mut self, cancel: &CancellationToken) -> DriverResult<()>;
    async fn rollback(&mut self, cancel: &CancellationToken) -> DriverResult<()>;
}
