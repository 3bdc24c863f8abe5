use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock, MutexGuard, PoisonError, RwLock};
use std::thread;

use crate::metrics::{GaugeSink, Tags};
use crate::transaction::{CurrentTransaction, Namespace, Transaction};
use crate::Agent;

static PROCESS_REGISTRY: LazyLock<(Arc<Registry>, thread::ThreadId)> =
    LazyLock::new(|| (Arc::new(Registry::new(None)), thread::current().id()));

thread_local! {
    static THREAD_REGISTRY: RefCell<Arc<Registry>> = RefCell::new(
        if PROCESS_REGISTRY.1 == thread::current().id() {
            PROCESS_REGISTRY.0.clone()
        } else {
            Arc::new(Registry::new_from_top(&PROCESS_REGISTRY.0))
        }
    );
}

/// A guard that temporarily swaps the active registry in thread-local storage.
///
/// This type is `!Send` because it manages thread-local state and must be
/// dropped on the same thread where it was created.
pub struct SwitchGuard {
    inner: Option<Arc<Registry>>,
    _not_send: PhantomData<MutexGuard<'static, ()>>,
}

impl SwitchGuard {
    /// Swaps the current thread's registry by the one provided and returns a
    /// guard that, when dropped, restores the previous one.
    pub fn new(registry: Arc<Registry>) -> Self {
        let inner = THREAD_REGISTRY
            .try_with(|current| {
                let mut current = current.borrow_mut();
                if Arc::ptr_eq(&current, &registry) {
                    return None;
                }
                Some(std::mem::replace(&mut *current, registry))
            })
            .ok()
            .flatten();
        SwitchGuard {
            inner,
            _not_send: PhantomData,
        }
    }
}

impl Drop for SwitchGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.inner.take() {
            // the thread local may already be gone during thread teardown
            let _ = THREAD_REGISTRY.try_with(|current| *current.borrow_mut() = previous);
        }
    }
}

/// Holds the agent and the current transaction of an execution context.
///
/// Every thread has its own registry.  The main thread uses the process
/// registry returned by [`Registry::main`]; other threads start out with a
/// registry that shares the agent of the process registry but has an empty
/// transaction slot.  Futures can carry a registry across threads with
/// [`bind_registry`](crate::RegistryFutureExt::bind_registry).
pub struct Registry {
    agent: RwLock<Option<Arc<Agent>>>,
    current: RwLock<Option<Transaction>>,
}

impl Registry {
    /// Creates a new registry with the given agent and an empty slot.
    pub fn new(agent: Option<Arc<Agent>>) -> Registry {
        Registry {
            agent: RwLock::new(agent),
            current: RwLock::new(None),
        }
    }

    /// Creates a new registry sharing the agent of `other` with an empty slot.
    pub fn new_from_top<R: AsRef<Registry>>(other: R) -> Registry {
        Registry::new(other.as_ref().agent())
    }

    /// Returns the registry of the current thread.
    ///
    /// To control which registry is current, use [`Registry::run`].
    pub fn current() -> Arc<Registry> {
        Registry::with(Arc::clone)
    }

    /// Returns the main thread's registry.
    pub fn main() -> Arc<Registry> {
        PROCESS_REGISTRY.0.clone()
    }

    /// Invokes the callback with the registry of the current thread.
    pub fn with<F, R>(f: F) -> R
    where
        F: FnOnce(&Arc<Registry>) -> R,
    {
        let registry = THREAD_REGISTRY
            .try_with(|current| current.borrow().clone())
            .unwrap_or_else(|_| Registry::main());
        f(&registry)
    }

    /// Binds a registry to the current thread for the duration of the call.
    ///
    /// Once `f` returns, including after it panicked, the previous registry is
    /// re-installed.
    pub fn run<F: FnOnce() -> R, R>(registry: Arc<Registry>, f: F) -> R {
        let _guard = SwitchGuard::new(registry);
        f()
    }

    /// Returns the bound agent.
    pub fn agent(&self) -> Option<Arc<Agent>> {
        self.agent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Binds a new agent to the registry.
    pub fn bind_agent(&self, agent: Option<Arc<Agent>>) {
        *self.agent.write().unwrap_or_else(PoisonError::into_inner) = agent;
    }

    /// Returns `true` if an active agent is bound.
    pub fn is_active(&self) -> bool {
        self.agent().is_some_and(|agent| agent.is_active())
    }

    /// Starts a transaction and registers it as the current one.
    ///
    /// An already running transaction is returned unchanged.  Without an
    /// active agent this returns [`CurrentTransaction::Inactive`].
    pub fn start_transaction(self: &Arc<Self>, namespace: Namespace) -> CurrentTransaction {
        let Some(agent) = self.agent().filter(|agent| agent.is_active()) else {
            return CurrentTransaction::Inactive;
        };
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(transaction) = current.as_ref().filter(|t| !t.is_completed()) {
            return CurrentTransaction::Active(transaction.clone());
        }
        let transaction = Transaction::new(Some(agent), Arc::downgrade(self), namespace);
        *current = Some(transaction.clone());
        CurrentTransaction::Active(transaction)
    }

    /// Returns the current transaction of this registry.
    pub fn current_transaction(&self) -> CurrentTransaction {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|transaction| !transaction.is_completed())
            .into()
    }

    /// Replaces the current transaction, returning the previous one.
    pub fn bind_transaction(&self, transaction: Option<Transaction>) -> Option<Transaction> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, transaction)
    }

    /// Clears the slot if it still holds `transaction`.
    pub(crate) fn release_transaction(&self, transaction: &Transaction) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|t| t.ptr_eq(transaction)) {
            *current = None;
        }
    }

    /// Emits a gauge through the bound agent.
    pub fn set_gauge(&self, key: &str, value: f64, tags: &Tags) {
        if let Some(agent) = self.agent().filter(|agent| agent.is_active()) {
            agent.set_gauge(key, value, tags);
        }
    }
}

impl GaugeSink for Registry {
    fn set_gauge(&self, key: &str, value: f64, tags: &Tags) {
        Registry::set_gauge(self, key, value, tags)
    }
}

impl AsRef<Registry> for Registry {
    fn as_ref(&self) -> &Registry {
        self
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("agent", &self.agent())
            .field("current", &self.current_transaction())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestTransport;
    use crate::AgentOptions;

    fn active_registry() -> Arc<Registry> {
        let agent = Agent::with_options(AgentOptions {
            active: true,
            transport: Some(Arc::new(TestTransport::new())),
            ..Default::default()
        });
        Arc::new(Registry::new(Some(Arc::new(agent))))
    }

    #[test]
    fn test_one_transaction_per_registry() {
        let registry = active_registry();
        let first = registry.start_transaction(Namespace::HttpRequest);
        let second = registry.start_transaction(Namespace::BackgroundJob);
        assert!(first
            .transaction()
            .unwrap()
            .ptr_eq(second.transaction().unwrap()));
        assert_eq!(second.transaction().unwrap().namespace(), Namespace::HttpRequest);
    }

    #[test]
    fn test_complete_clears_slot() {
        let registry = active_registry();
        let transaction = registry.start_transaction(Namespace::HttpRequest);
        assert!(registry.current_transaction().is_active());
        transaction.complete();
        assert!(!registry.current_transaction().is_active());
    }

    #[test]
    fn test_release_keeps_foreign_transaction() {
        let registry = active_registry();
        let first = registry.start_transaction(Namespace::HttpRequest);
        let previous = registry.bind_transaction(None);
        assert!(previous.is_some());
        let second = registry.start_transaction(Namespace::HttpRequest);
        first.complete();
        assert!(registry
            .current_transaction()
            .transaction()
            .unwrap()
            .ptr_eq(second.transaction().unwrap()));
    }

    #[test]
    fn test_inactive_without_agent() {
        let registry = Arc::new(Registry::new(None));
        assert!(!registry.is_active());
        assert!(!registry.start_transaction(Namespace::HttpRequest).is_active());
    }

    #[test]
    fn test_run_switches_thread_registry() {
        let registry = active_registry();
        Registry::run(registry.clone(), || {
            assert!(Arc::ptr_eq(&Registry::current(), &registry));
        });
        assert!(!Arc::ptr_eq(&Registry::current(), &registry));
    }

    #[test]
    fn test_threads_get_fresh_slot() {
        let registry = active_registry();
        Registry::run(registry.clone(), || {
            registry.start_transaction(Namespace::HttpRequest);
            let seen = thread::spawn(|| Registry::current().current_transaction().is_active())
                .join()
                .unwrap();
            assert!(!seen);
        });
    }
}
