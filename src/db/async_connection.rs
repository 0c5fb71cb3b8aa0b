//! The asynchronous connection scope.
//!
//! Same flattening rules as [`ConnectionScope`](super::ConnectionScope), with
//! suspending physical I/O. Cancellation tokens are handed to the driver as
//! received; the scope itself never checks them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ulid::Ulid;

use super::config::ConnectionScopeConfig;
use crate::driver::{
    AsyncDbConnection, AsyncDbTransaction, ConnectionState, DriverResult, ListenerId,
    SchemaTable, StateChangeEvent, StateChangeHandlers, StateChangeListener,
};
use crate::transaction::{
    AsyncCompletionBehavior, AsyncTransactionScope, IsolationLevel, ScopeCore, ScopeSlot,
};

type AsyncSlot<T> = ScopeSlot<T, dyn AsyncCompletionBehavior>;

/// An async connection that flattens nested transactions.
///
/// Call [`dispose`](Self::dispose) to resolve the active transaction scope.
/// Dropping the scope instead cannot await a commit or rollback: the
/// physical transaction is released as-is and the driver's drop behavior
/// decides its fate.
pub struct AsyncConnectionScope<C: AsyncDbConnection> {
    id: Ulid,
    inner: C,
    completion: Arc<dyn AsyncCompletionBehavior>,
    default_isolation: IsolationLevel,
    slot: Arc<AsyncSlot<C::Transaction>>,
    handlers: Arc<StateChangeHandlers>,
    subscription: Option<ListenerId>,
    released: bool,
}

impl<C: AsyncDbConnection> AsyncConnectionScope<C> {
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, &ConnectionScopeConfig::default())
    }

    pub fn with_config(inner: C, config: &ConnectionScopeConfig) -> Self {
        Self::build(
            inner,
            config.completion.async_behavior(),
            config.default_isolation,
        )
    }

    pub fn with_completion(inner: C, completion: Arc<dyn AsyncCompletionBehavior>) -> Self {
        Self::build(inner, completion, IsolationLevel::default())
    }

    fn build(
        mut inner: C,
        completion: Arc<dyn AsyncCompletionBehavior>,
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

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    // ==================== Transactions ====================

    /// Begin a transaction with the configured default isolation level.
    pub async fn begin_transaction(
        &mut self,
        cancel: &CancellationToken,
    ) -> DriverResult<AsyncTransactionScope<C::Transaction>> {
        let isolation = self.default_isolation;
        self.begin_transaction_with(isolation, cancel).await
    }

    /// Begin a transaction, reusing the active scope if there is one.
    ///
    /// `&mut self` keeps a second begin from running while the physical
    /// begin is suspended, so at most one physical transaction is created.
    pub async fn begin_transaction_with(
        &mut self,
        isolation: IsolationLevel,
        cancel: &CancellationToken,
    ) -> DriverResult<AsyncTransactionScope<C::Transaction>> {
        let core = match self.slot.current() {
            Some(core) => core,
            None => {
                let transaction = self.inner.begin_transaction(isolation, cancel).await?;
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
        Ok(AsyncTransactionScope::from_core(core))
    }

    pub fn active_scope(&self) -> Option<AsyncTransactionScope<C::Transaction>> {
        self.slot.current().map(AsyncTransactionScope::from_core)
    }

    pub fn in_transaction(&self) -> bool {
        !self.slot.is_empty()
    }

    // ==================== Events ====================

    pub fn on_state_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChangeEvent) + Send + Sync + 'static,
    {
        self.handlers.add(Arc::new(listener))
    }

    // ==================== Teardown ====================

    /// Resolve any active transaction scope and release the connection.
    pub async fn dispose(mut self, cancel: &CancellationToken) -> DriverResult<()> {
        self.released = true;

        let result = match self.active_scope() {
            Some(scope) => scope.complete(cancel).await,
            None => Ok(()),
        };
        self.detach();
        result
    }

    fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.inner.remove_state_change_listener(subscription);
        }
    }
}

#[async_trait]
impl<C: AsyncDbConnection> AsyncDbConnection for AsyncConnectionScope<C> {
    type Transaction = AsyncTransactionScope<C::Transaction>;
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

    async fn open(&mut self, cancel: &CancellationToken) -> DriverResult<()> {
        self.inner.open(cancel).await
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.inner.close().await
    }

    async fn change_database(
        &mut self,
        database: &str,
        cancel: &CancellationToken,
    ) -> DriverResult<()> {
        self.inner.change_database(database, cancel).await
    }

    fn create_command(&self) -> C::Command {
        self.inner.create_command()
    }

    fn enlist_transaction(&mut self, transaction: Option<C::Enlistment>) -> DriverResult<()> {
        self.inner.enlist_transaction(transaction)
    }

    async fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
        cancel: &CancellationToken,
    ) -> DriverResult<AsyncTransactionScope<C::Transaction>> {
        self.begin_transaction_with(isolation, cancel).await
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

impl<C: AsyncDbConnection> Drop for AsyncConnectionScope<C> {
    fn drop(&mut self) {
        if !self.released {
            if let Some(scope) = self.active_scope() {
                if scope.abandon() {
                    warn!(
                        connection = %self.id,
                        scope = %scope.id(),
                        "async connection scope dropped without dispose; transaction abandoned"
                    );
                }
            }
        }
        self.detach();
    }
}

impl<C: AsyncDbConnection> std::fmt::Debug for AsyncConnectionScope<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncConnectionScope")
            .field("id", &self.id)
            .field("completion", &self.completion.name())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
