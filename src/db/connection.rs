//! The blocking connection scope.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use ulid::Ulid;

use super::config::ConnectionScopeConfig;
use crate::driver::{
    ConnectionState, DbConnection, DbTransaction, DriverResult, ListenerId, SchemaTable,
    StateChangeEvent, StateChangeHandlers, StateChangeListener,
};
use crate::transaction::{
    CompletionBehavior, IsolationLevel, ScopeCore, ScopeSlot, TransactionScope,
};

type SyncSlot<T> = ScopeSlot<T, dyn CompletionBehavior>;

/// A connection that flattens nested transactions.
///
/// Wraps a physical connection and hands out at most one
/// [`TransactionScope`] at a time. Every other operation is forwarded to the
/// physical connection unchanged.
///
/// Disposing the scope (explicitly, or by dropping it) resolves any active
/// transaction scope before the physical connection is released: committed
/// if every begin was matched by a commit, rolled back otherwise.
pub struct ConnectionScope<C: DbConnection> {
    id: Ulid,
    inner: C,
    completion: Arc<dyn CompletionBehavior>,
    default_isolation: IsolationLevel,
    slot: Arc<SyncSlot<C::Transaction>>,
    handlers: Arc<StateChangeHandlers>,
    subscription: Option<ListenerId>,
    released: bool,
}

impl<C: DbConnection> ConnectionScope<C> {
    /// Wrap a connection, committing balanced transactions.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, &ConnectionScopeConfig::default())
    }

    /// Wrap a connection using the given configuration.
    pub fn with_config(inner: C, config: &ConnectionScopeConfig) -> Self {
        Self::build(inner, config.completion.behavior(), config.default_isolation)
    }

    /// Wrap a connection with a custom completion behavior.
    pub fn with_completion(inner: C, completion: Arc<dyn CompletionBehavior>) -> Self {
        Self::build(inner, completion, IsolationLevel::default())
    }

    fn build(
        mut inner: C,
        completion: Arc<dyn CompletionBehavior>,
        default_isolation: IsolationLevel,
    ) -> Self {
        let handlers = Arc::new(StateChangeHandlers::new());
        let forward = StateChangeHandlers::forwarder(&handlers);
        let subscription = inner.add_state_change_listener(forward);

        Self {
            id: Ulid::new(),
            inner,
            completion,
            default_isolation,
            slot: ScopeSlot::new(),
            handlers,
            subscription: Some(subscription),
            released: false,
        }
    }

    /// Get the connection scope ID.
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Get the decorated physical connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    // ==================== Transactions ====================

    /// Begin a transaction with the configured default isolation level.
    pub fn begin_transaction(&mut self) -> DriverResult<TransactionScope<C::Transaction>> {
        self.begin_transaction_with(self.default_isolation)
    }

    /// Begin a transaction.
    ///
    /// Starts a physical transaction only if none is active. Otherwise the
    /// active scope is reused and `isolation` is ignored.
    pub fn begin_transaction_with(
        &mut self,
        isolation: IsolationLevel,
    ) -> DriverResult<TransactionScope<C::Transaction>> {
        let core = match self.slot.current() {
            Some(core) => core,
            None => {
                let transaction = self.inner.begin_transaction(isolation)?;
                let started = transaction.isolation_level();
                let core = ScopeCore::new(
                    self.id,
                    transaction,
                    started,
                    Arc::clone(&self.completion),
                    &self.slot,
                );
                self.slot.install(Arc::clone(&core));
                debug!(
                    scope = %core.id(),
                    connection = %self.id,
                    isolation = %started,
                    "transaction scope started"
                );
                core
            }
        };

        let begins = core.increment_begin();
        if begins > 1 {
            debug!(
                scope = %core.id(),
                begins,
                requested = %isolation,
                "transaction scope reused"
            );
        }
        Ok(TransactionScope::from_core(core))
    }

    /// Get the active transaction scope, if any.
    pub fn active_scope(&self) -> Option<TransactionScope<C::Transaction>> {
        self.slot.current().map(TransactionScope::from_core)
    }

    /// Check if a transaction scope is active.
    pub fn in_transaction(&self) -> bool {
        !self.slot.is_empty()
    }

    // ==================== Events ====================

    /// Register a listener for state changes of the physical connection.
    pub fn on_state_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChangeEvent) + Send + Sync + 'static,
    {
        self.handlers.add(Arc::new(listener))
    }

    // ==================== Teardown ====================

    /// Resolve any active transaction scope and release the connection.
    ///
    /// A driver failure while resolving is returned after the physical
    /// transaction and connection have been released.
    pub fn dispose(mut self) -> DriverResult<()> {
        self.release()
    }

    fn release(&mut self) -> DriverResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let result = match self.active_scope() {
            Some(scope) => scope.complete(),
            None => Ok(()),
        };

        if let Some(subscription) = self.subscription.take() {
            self.inner.remove_state_change_listener(subscription);
        }
        result
    }
}

/// The decorator is itself a connection, so code written against
/// [`DbConnection`] can use it in place of the physical one.
impl<C: DbConnection> DbConnection for ConnectionScope<C> {
    type Transaction = TransactionScope<C::Transaction>;
    type Command = C::Command;
    type Enlistment = C::Enlistment;

    fn connection_string(&self) -> &str {
        self.inner.connection_string()
    }

    fn set_connection_string(&mut self, value: String) {
        self.inner.set_connection_string(value);
    }

    fn connection_timeout(&self) -> Duration {
        self.inner.connection_timeout()
    }

    fn database(&self) -> &str {
        self.inner.database()
    }

    fn data_source(&self) -> &str {
        self.inner.data_source()
    }

    fn server_version(&self) -> &str {
        self.inner.server_version()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    fn open(&mut self) -> DriverResult<()> {
        self.inner.open()
    }

    fn close(&mut self) -> DriverResult<()> {
        self.inner.close()
    }

    fn change_database(&mut self, database: &str) -> DriverResult<()> {
        self.inner.change_database(database)
    }

    fn create_command(&self) -> C::Command {
        self.inner.create_command()
    }

    fn enlist_transaction(&mut self, transaction: Option<C::Enlistment>) -> DriverResult<()> {
        self.inner.enlist_transaction(transaction)
    }

    fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
    ) -> DriverResult<TransactionScope<C::Transaction>> {
        self.begin_transaction_with(isolation)
    }

    fn get_schema(&mut self) -> DriverResult<SchemaTable> {
        self.inner.get_schema()
    }

    fn get_schema_collection(&mut self, collection: &str) -> DriverResult<SchemaTable> {
        self.inner.get_schema_collection(collection)
    }

    fn get_schema_restricted(
        &mut self,
        collection: &str,
        restrictions: &[Option<&str>],
    ) -> DriverResult<SchemaTable> {
        self.inner.get_schema_restricted(collection, restrictions)
    }

    fn add_state_change_listener(&mut self, listener: StateChangeListener) -> ListenerId {
        self.handlers.add(listener)
    }

    fn remove_state_change_listener(&mut self, id: ListenerId) -> bool {
        self.handlers.remove(id)
    }
}

impl<C: DbConnection> Drop for ConnectionScope<C> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(connection = %self.id, error = %e, "failed to resolve transaction scope on drop");
        }
    }
}

impl<C: DbConnection> std::fmt::Debug for ConnectionScope<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionScope")
            .field("id", &self.id)
            .field("completion", &self.completion.name())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
