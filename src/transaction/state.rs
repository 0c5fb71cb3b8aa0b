//! Shared bookkeeping behind a transaction scope.
//!
//! A [`ScopeCore`] holds the physical transaction and the begin/commit
//! counters. Every handle returned by a begin call points at the same core.
//! The owning connection keeps the live core in a [`ScopeSlot`]; the core
//! holds only a weak reference back so it can clear the slot on resolution.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use ulid::Ulid;

use crate::transaction::completion::ScopeOutcome;
use crate::transaction::isolation::IsolationLevel;

/// Point-in-time view of a transaction scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeInfo {
    /// Unique scope ID.
    pub scope_id: Ulid,
    /// ID of the connection scope that created this scope.
    pub connection_id: Ulid,
    /// Isolation level of the physical transaction.
    pub isolation: IsolationLevel,
    /// Number of begin calls satisfied by this scope.
    pub begin_count: usize,
    /// Number of commit calls received.
    pub commit_count: usize,
    /// Whether the physical transaction has been released.
    pub resolved: bool,
    /// How the physical transaction ended, once it did.
    pub outcome: Option<ScopeOutcome>,
    /// When the physical transaction was started.
    pub started_at: DateTime<Utc>,
}

struct ScopeState<T> {
    transaction: Option<T>,
    begin_count: usize,
    commit_count: usize,
    outcome: Option<ScopeOutcome>,
}

impl<T> ScopeState<T> {
    fn is_balanced(&self) -> bool {
        self.commit_count == self.begin_count
    }
}

/// A physical transaction taken out of its scope for resolution.
pub(crate) struct Resolution<T> {
    pub transaction: T,
    /// Every begin was matched by a commit.
    pub balanced: bool,
    pub begin_count: usize,
    pub commit_count: usize,
}

/// Shared state of one transaction scope.
///
/// `B` is the completion behavior trait object of the sync or async flavour.
pub(crate) struct ScopeCore<T, B: ?Sized> {
    id: Ulid,
    connection_id: Ulid,
    isolation: IsolationLevel,
    started_at: DateTime<Utc>,
    completion: Arc<B>,
    state: Mutex<ScopeState<T>>,
    slot: Weak<ScopeSlot<T, B>>,
}

impl<T, B: ?Sized> ScopeCore<T, B> {
    /// Wrap a freshly started physical transaction.
    pub fn new(
        connection_id: Ulid,
        transaction: T,
        isolation: IsolationLevel,
        completion: Arc<B>,
        slot: &Arc<ScopeSlot<T, B>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Ulid::new(),
            connection_id,
            isolation,
            started_at: Utc::now(),
            completion,
            state: Mutex::new(ScopeState {
                transaction: Some(transaction),
                begin_count: 0,
                commit_count: 0,
                outcome: None,
            }),
            slot: Arc::downgrade(slot),
        })
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn connection_id(&self) -> Ulid {
        self.connection_id
    }

    pub fn completion(&self) -> &B {
        &self.completion
    }

    /// Run `f` against the live physical transaction, if any.
    pub fn with_transaction<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.state.lock().transaction.as_ref().map(f)
    }

    /// Isolation level recorded when the physical transaction started.
    pub fn started_isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn increment_begin(&self) -> usize {
        let mut state = self.state.lock();
        state.begin_count += 1;
        state.begin_count
    }

    /// Count a commit. Returns true when every begin is now matched and the
    /// physical transaction is still live.
    pub fn record_commit(&self) -> bool {
        let mut state = self.state.lock();
        state.commit_count += 1;
        state.transaction.is_some() && state.is_balanced()
    }

    pub fn begin_count(&self) -> usize {
        self.state.lock().begin_count
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().commit_count
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().transaction.is_none()
    }

    /// Take the physical transaction out for resolution.
    ///
    /// Returns `None` if the scope was already resolved, so resolution can
    /// happen at most once.
    pub fn take(&self) -> Option<Resolution<T>> {
        let mut state = self.state.lock();
        let transaction = state.transaction.take()?;
        Some(Resolution {
            transaction,
            balanced: state.is_balanced(),
            begin_count: state.begin_count,
            commit_count: state.commit_count,
        })
    }

    /// Guard that finishes this scope when dropped.
    ///
    /// Taken right after [`take`](Self::take), so the connection is freed
    /// even if resolution stops halfway, e.g. a suspended commit whose
    /// future is dropped.
    pub fn finish_guard(self: &Arc<Self>) -> FinishGuard<'_, T, B> {
        FinishGuard {
            core: self,
            outcome: None,
        }
    }

    /// Record the outcome and detach from the owning connection.
    pub fn finish(self: &Arc<Self>, outcome: Option<ScopeOutcome>) {
        self.state.lock().outcome = outcome;
        if let Some(slot) = self.slot.upgrade() {
            slot.clear(self);
        }
    }

    pub fn info(&self) -> ScopeInfo {
        let state = self.state.lock();
        ScopeInfo {
            scope_id: self.id,
            connection_id: self.connection_id,
            isolation: self.isolation,
            begin_count: state.begin_count,
            commit_count: state.commit_count,
            resolved: state.transaction.is_none(),
            outcome: state.outcome,
            started_at: self.started_at,
        }
    }
}

/// Finishes a scope when dropped, with whatever outcome was recorded.
pub(crate) struct FinishGuard<'a, T, B: ?Sized> {
    core: &'a Arc<ScopeCore<T, B>>,
    outcome: Option<ScopeOutcome>,
}

impl<T, B: ?Sized> FinishGuard<'_, T, B> {
    pub fn set_outcome(&mut self, outcome: Option<ScopeOutcome>) {
        self.outcome = outcome;
    }
}

impl<T, B: ?Sized> Drop for FinishGuard<'_, T, B> {
    fn drop(&mut self) {
        self.core.finish(self.outcome);
    }
}

/// Holder of the live scope of one connection.
pub(crate) struct ScopeSlot<T, B: ?Sized> {
    current: Mutex<Option<Arc<ScopeCore<T, B>>>>,
}

impl<T, B: ?Sized> ScopeSlot<T, B> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
        })
    }

    /// The live scope, if any. A resolved scope still in the slot is
    /// discarded rather than returned.
    pub fn current(&self) -> Option<Arc<ScopeCore<T, B>>> {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|core| core.is_resolved()) {
            *current = None;
        }
        current.clone()
    }

    pub fn install(&self, core: Arc<ScopeCore<T, B>>) {
        let mut current = self.current.lock();
        debug_assert!(current.is_none(), "connection already has an active scope");
        *current = Some(core);
    }

    /// Clear the slot if it still holds `core`.
    pub fn clear(&self, core: &Arc<ScopeCore<T, B>>) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|live| Arc::ptr_eq(live, core)) {
            *current = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_none()
    }
}
