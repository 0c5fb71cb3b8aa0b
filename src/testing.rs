//! Recording mock driver for unit tests.
//!
//! Every physical call is appended to a shared [`Journal`], so tests can
//! assert on exactly what reached the driver and in which order.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::driver::{
    AsyncDbConnection, AsyncDbTransaction, ConnectionState, DbConnection, DbTransaction,
    DriverError, DriverResult, ListenerId, SchemaTable, StateChangeEvent, StateChangeHandlers,
    StateChangeListener,
};
use crate::transaction::IsolationLevel;

pub(crate) const CONNECTION_STRING: &str = "Server=localhost;Database=SomeDatabase";
pub(crate) const DATABASE: &str = "SomeDatabase";
pub(crate) const DATA_SOURCE: &str = "SomeDataSource";
pub(crate) const SERVER_VERSION: &str = "16.0.1000";
pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(42);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Open,
    Close,
    ChangeDatabase(String),
    CreateCommand,
    SetConnectionString(String),
    GetSchema {
        collection: String,
        restrictions: Vec<Option<String>>,
    },
    Enlist(Option<String>),
    Subscribe,
    Unsubscribe,
    Begin { tx: u32, isolation: IsolationLevel },
    Commit(u32),
    Rollback(u32),
    ReleaseTransaction(u32),
    ReleaseConnection,
}

#[derive(Default)]
pub(crate) struct Journal {
    calls: Mutex<Vec<Call>>,
    next_tx: AtomicU32,
    fail_commits: AtomicBool,
    fail_rollbacks: AtomicBool,
    fail_begins: AtomicBool,
    hang_commits: AtomicBool,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn begins(&self) -> usize {
        self.count(|call| matches!(call, Call::Begin { .. }))
    }

    pub fn commits(&self) -> usize {
        self.count(|call| matches!(call, Call::Commit(_)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|call| matches!(call, Call::Rollback(_)))
    }

    pub fn released_transactions(&self) -> usize {
        self.count(|call| matches!(call, Call::ReleaseTransaction(_)))
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollbacks(&self, fail: bool) {
        self.fail_rollbacks.store(fail, Ordering::SeqCst);
    }

    pub fn fail_begins(&self, fail: bool) {
        self.fail_begins.store(fail, Ordering::SeqCst);
    }

    /// Make async commits suspend forever before reaching the journal.
    pub fn hang_commits(&self, hang: bool) {
        self.hang_commits.store(hang, Ordering::SeqCst);
    }

    fn next_tx(&self) -> u32 {
        self.next_tx.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub(crate) struct MockTransaction {
    id: u32,
    isolation: IsolationLevel,
    journal: Arc<Journal>,
}

impl MockTransaction {
    pub fn new(journal: &Arc<Journal>, isolation: IsolationLevel) -> Self {
        Self {
            id: journal.next_tx(),
            isolation,
            journal: Arc::clone(journal),
        }
    }

    fn finish(&self, call: Call, fail: &AtomicBool, operation: &'static str) -> DriverResult<()> {
        self.journal.record(call);
        if fail.load(Ordering::SeqCst) {
            return Err(DriverError::operation(operation, "simulated failure"));
        }
        Ok(())
    }
}

impl DbTransaction for MockTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.finish(Call::Commit(self.id), &self.journal.fail_commits, "commit")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.finish(Call::Rollback(self.id), &self.journal.fail_rollbacks, "rollback")
    }
}

#[async_trait]
impl AsyncDbTransaction for MockTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    async fn commit(&mut self, cancel: &CancellationToken) -> DriverResult<()> {
        if self.journal.hang_commits.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if cancel.is_cancelled() {
            self.journal.record(Call::Commit(self.id));
            return Err(DriverError::Cancelled);
        }
        self.finish(Call::Commit(self.id), &self.journal.fail_commits, "commit")
    }

    async fn rollback(&mut self, cancel: &CancellationToken) -> DriverResult<()> {
        if cancel.is_cancelled() {
            self.journal.record(Call::Rollback(self.id));
            return Err(DriverError::Cancelled);
        }
        self.finish(Call::Rollback(self.id), &self.journal.fail_rollbacks, "rollback")
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        self.journal.record(Call::ReleaseTransaction(self.id));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockCommand {
    pub connection_string: String,
}

pub(crate) struct MockConnection {
    journal: Arc<Journal>,
    connection_string: String,
    database: String,
    state: ConnectionState,
    handlers: StateChangeHandlers,
}

impl MockConnection {
    pub fn new() -> (Self, Arc<Journal>) {
        let journal = Journal::new();
        let connection = Self {
            journal: Arc::clone(&journal),
            connection_string: CONNECTION_STRING.to_string(),
            database: DATABASE.to_string(),
            state: ConnectionState::Closed,
            handlers: StateChangeHandlers::new(),
        };
        (connection, journal)
    }

    fn set_state(&mut self, next: ConnectionState) {
        let event = StateChangeEvent::new(self.state, next);
        self.state = next;
        self.handlers.raise(&event);
    }

    fn start_transaction(&self, isolation: IsolationLevel) -> DriverResult<MockTransaction> {
        if self.journal.fail_begins.load(Ordering::SeqCst) {
            return Err(DriverError::operation("begin", "simulated failure"));
        }
        let tx = MockTransaction::new(&self.journal, isolation);
        self.journal.record(Call::Begin { tx: tx.id, isolation });
        Ok(tx)
    }

    fn schema(&self, collection: &str, restrictions: &[Option<&str>]) -> SchemaTable {
        self.journal.record(Call::GetSchema {
            collection: collection.to_string(),
            restrictions: restrictions
                .iter()
                .map(|value| value.map(str::to_string))
                .collect(),
        });
        SchemaTable::new(collection)
    }

    fn subscribe(&mut self, listener: StateChangeListener) -> ListenerId {
        self.journal.record(Call::Subscribe);
        self.handlers.add(listener)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.journal.record(Call::Unsubscribe);
        self.handlers.remove(id)
    }

    fn command(&self) -> MockCommand {
        self.journal.record(Call::CreateCommand);
        MockCommand {
            connection_string: self.connection_string.clone(),
        }
    }

    fn assign_connection_string(&mut self, value: String) {
        self.journal.record(Call::SetConnectionString(value.clone()));
        self.connection_string = value;
    }

    fn switch_database(&mut self, database: &str) {
        self.journal.record(Call::ChangeDatabase(database.to_string()));
        self.database = database.to_string();
    }
}

impl DbConnection for MockConnection {
    type Transaction = MockTransaction;
    type Command = MockCommand;
    type Enlistment = String;

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn set_connection_string(&mut self, value: String) {
        self.assign_connection_string(value);
    }

    fn connection_timeout(&self) -> Duration {
        CONNECTION_TIMEOUT
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn data_source(&self) -> &str {
        DATA_SOURCE
    }

    fn server_version(&self) -> &str {
        SERVER_VERSION
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn open(&mut self) -> DriverResult<()> {
        self.journal.record(Call::Open);
        self.set_state(ConnectionState::Open);
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.journal.record(Call::Close);
        self.set_state(ConnectionState::Closed);
        Ok(())
    }

    fn change_database(&mut self, database: &str) -> DriverResult<()> {
        self.switch_database(database);
        Ok(())
    }

    fn create_command(&self) -> MockCommand {
        self.command()
    }

    fn enlist_transaction(&mut self, transaction: Option<String>) -> DriverResult<()> {
        self.journal.record(Call::Enlist(transaction));
        Ok(())
    }

    fn begin_transaction(&mut self, isolation: IsolationLevel) -> DriverResult<MockTransaction> {
        self.start_transaction(isolation)
    }

    fn get_schema_restricted(
        &mut self,
        collection: &str,
        restrictions: &[Option<&str>],
    ) -> DriverResult<SchemaTable> {
        Ok(self.schema(collection, restrictions))
    }

    fn add_state_change_listener(&mut self, listener: StateChangeListener) -> ListenerId {
        self.subscribe(listener)
    }

    fn remove_state_change_listener(&mut self, id: ListenerId) -> bool {
        self.unsubscribe(id)
    }
}

#[async_trait]
impl AsyncDbConnection for MockConnection {
    type Transaction = MockTransaction;
    type Command = MockCommand;
    type Enlistment = String;

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn set_connection_string(&mut self, value: String) {
        self.assign_connection_string(value);
    }

    fn connection_timeout(&self) -> Duration {
        CONNECTION_TIMEOUT
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn data_source(&self) -> &str {
        DATA_SOURCE
    }

    fn server_version(&self) -> &str {
        SERVER_VERSION
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self, cancel: &CancellationToken) -> DriverResult<()> {
        self.journal.record(Call::Open);
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        self.set_state(ConnectionState::Open);
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.journal.record(Call::Close);
        self.set_state(ConnectionState::Closed);
        Ok(())
    }

    async fn change_database(
        &mut self,
        database: &str,
        cancel: &CancellationToken,
    ) -> DriverResult<()> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        self.switch_database(database);
        Ok(())
    }

    fn create_command(&self) -> MockCommand {
        self.command()
    }

    fn enlist_transaction(&mut self, transaction: Option<String>) -> DriverResult<()> {
        self.journal.record(Call::Enlist(transaction));
        Ok(())
    }

    async fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
        cancel: &CancellationToken,
    ) -> DriverResult<MockTransaction> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        self.start_transaction(isolation)
    }

    fn get_schema_restricted(
        &mut self,
        collection: &str,
        restrictions: &[Option<&str>],
    ) -> DriverResult<SchemaTable> {
        Ok(self.schema(collection, restrictions))
    }

    fn add_state_change_listener(&mut self, listener: StateChangeListener) -> ListenerId {
        self.subscribe(listener)
    }

    fn remove_state_change_listener(&mut self, id: ListenerId) -> bool {
        self.unsubscribe(id)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.journal.record(Call::ReleaseConnection);
    }
}
