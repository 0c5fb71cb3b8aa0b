//! Physical connection capability traits.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::error::DriverResult;
use crate::driver::events::{ListenerId, StateChangeListener};
use crate::driver::schema::{SchemaTable, METADATA_COLLECTIONS};
use crate::driver::transaction::{AsyncDbTransaction, DbTransaction};
use crate::transaction::IsolationLevel;

/// State of a physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Open,
    Connecting,
    Executing,
    Fetching,
    Broken,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "Closed",
            ConnectionState::Open => "Open",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Executing => "Executing",
            ConnectionState::Fetching => "Fetching",
            ConnectionState::Broken => "Broken",
        };
        f.write_str(name)
    }
}

/// A blocking physical database connection.
///
/// A connection supports one active physical transaction at a time. The
/// connection is released by dropping it.
pub trait DbConnection {
    /// Physical transaction type produced by [`begin_transaction`](Self::begin_transaction).
    type Transaction: DbTransaction + 'static;
    /// Command type produced by [`create_command`](Self::create_command).
    type Command;
    /// Ambient transaction type accepted by [`enlist_transaction`](Self::enlist_transaction).
    type Enlistment;

    fn connection_string(&self) -> &str;
    fn set_connection_string(&mut self, value: String);
    fn connection_timeout(&self) -> Duration;
    fn database(&self) -> &str;
    fn data_source(&self) -> &str;
    fn server_version(&self) -> &str;
    fn state(&self) -> ConnectionState;

    fn open(&mut self) -> DriverResult<()>;
    fn close(&mut self) -> DriverResult<()>;
    fn change_database(&mut self, database: &str) -> DriverResult<()>;
    fn create_command(&self) -> Self::Command;
    fn enlist_transaction(&mut self, transaction: Option<Self::Enlistment>) -> DriverResult<()>;

    /// Start a physical transaction.
    fn begin_transaction(&mut self, isolation: IsolationLevel) -> DriverResult<Self::Transaction>;

    /// Schema information for the metadata collections.
    fn get_schema(&mut self) -> DriverResult<SchemaTable> {
        self.get_schema_collection(METADATA_COLLECTIONS)
    }

    /// Schema information for one collection.
    fn get_schema_collection(&mut self, collection: &str) -> DriverResult<SchemaTable> {
        self.get_schema_restricted(collection, &[])
    }

    /// Schema information for one collection, filtered by restriction values.
    fn get_schema_restricted(
        &mut self,
        collection: &str,
        restrictions: &[Option<&str>],
    ) -> DriverResult<SchemaTable>;

    /// Register a state-change listener.
    fn add_state_change_listener(&mut self, listener: StateChangeListener) -> ListenerId;

    /// Remove a previously registered state-change listener. Returns false if
    /// it was not registered.
    fn remove_state_change_listener(&mut self, id: ListenerId) -> bool;
}

/// A physical database connection with suspending I/O.
///
/// Cancellation tokens are passed through to the driver, which decides how
/// (and whether) to honour them.
#[async_trait]
pub trait AsyncDbConnection: Send {
    type Transaction: AsyncDbTransaction + 'static;
    type Command;
    type Enlistment: Send;

    fn connection_string(&self) -> &str;
    fn set_connection_string(&mut self, value: String);
    fn connection_timeout(&self) -> Duration;
    fn database(&self) -> &str;
    fn data_source(&self) -> &str;
    fn server_version(&self) -> &str;
    fn state(&self) -> ConnectionState;

    async fn open(&mut self, cancel: &CancellationToken) -> DriverResult<()>;
    async fn close(&mut self) -> DriverResult<()>;
    async fn change_database(
        &mut self,
        database: &str,
        cancel: &CancellationToken,
    ) -> DriverResult<()>;
    fn create_command(&self) -> Self::Command;
    fn enlist_transaction(&mut self, transaction: Option<Self::Enlistment>) -> DriverResult<()>;

    /// Start a physical transaction.
    async fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
        cancel: &CancellationToken,
    ) -> DriverResult<Self::Transaction>;

    fn get_schema(&mut self) -> DriverResult<SchemaTable> {
        self.get_schema_collection(METADATA_COLLECTIONS)
    }

    fn get_schema_collection(&mut self, collection: &str) -> DriverResult<SchemaTable> {
        self.get_schema_restricted(collection, &[])
    }

    fn get_schema_restricted(
        &mut self,
        collection: &str,
        restrictions: &[Option<&str>],
    ) -> DriverResult<SchemaTable>;

    fn add_state_change_listener(&mut self, listener: StateChangeListener) -> ListenerId;
    fn remove_state_change_listener(&mut self, id: ListenerId) -> bool;
}
