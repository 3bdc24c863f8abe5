//! This provides testing functionality for building tests.
//!
//! **Feature:** `test` (*disabled by default*)
//!
//! If the crate has been compiled with the test support feature this module
//! becomes available and provides functionality to capture completed
//! transactions and gauges in a block.
//!
//! # Example usage
//!
//! ```
//! use lantern_core::test::with_captured_transactions;
//! use lantern_core::{start_transaction, Namespace};
//!
//! let transactions = with_captured_transactions(|| {
//!     let transaction = start_transaction(Namespace::BackgroundJob);
//!     transaction.set_action("Worker#perform");
//!     transaction.complete();
//! });
//! assert_eq!(transactions.len(), 1);
//! assert_eq!(transactions[0].action.as_deref(), Some("Worker#perform"));
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use crate::metrics::{Gauge, GaugeSink, Tags};
use crate::transaction::TransactionData;
use crate::{Agent, AgentOptions, Registry, Transport};

/// Collects transactions and gauges instead of sending them.
///
/// # Examples
///
/// ```
/// use lantern_core::test::TestTransport;
/// use lantern_core::{AgentOptions, Registry};
/// use std::sync::Arc;
///
/// let transport = TestTransport::new();
/// let options = AgentOptions {
///     active: true,
///     transport: Some(Arc::new(transport.clone())),
///     ..AgentOptions::default()
/// };
/// Registry::current().bind_agent(Some(Arc::new(options.into())));
/// ```
pub struct TestTransport {
    transactions: Mutex<Vec<TransactionData>>,
    gauges: Mutex<Vec<Gauge>>,
}

impl TestTransport {
    /// Creates a new test transport.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestTransport> {
        Arc::new(TestTransport {
            transactions: Mutex::new(vec![]),
            gauges: Mutex::new(vec![]),
        })
    }

    /// Fetches and clears the collected transactions.
    pub fn fetch_and_clear_transactions(&self) -> Vec<TransactionData> {
        let mut guard = self
            .transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }

    /// Fetches and clears the collected gauges.
    pub fn fetch_and_clear_gauges(&self) -> Vec<Gauge> {
        let mut guard = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

impl Transport for TestTransport {
    fn send_transaction(&self, transaction: TransactionData) {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transaction);
    }

    fn send_gauge(&self, gauge: Gauge) {
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(gauge);
    }
}

/// A [`GaugeSink`] that records every observation.
#[derive(Debug, Default)]
pub struct TestSink {
    gauges: Mutex<Vec<(String, f64, Tags)>>,
}

impl TestSink {
    /// Creates an empty sink.
    pub fn new() -> TestSink {
        TestSink::default()
    }

    /// Fetches and clears the recorded observations.
    pub fn fetch_and_clear(&self) -> Vec<(String, f64, Tags)> {
        let mut guard = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

impl GaugeSink for TestSink {
    fn set_gauge(&self, key: &str, value: f64, tags: &Tags) {
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_owned(), value, tags.clone()));
    }
}

/// Runs some code with an active test agent and returns the completed transactions.
///
/// This is a shortcut for [`with_captured_transactions_options`] with default
/// options.
pub fn with_captured_transactions<F: FnOnce()>(f: F) -> Vec<TransactionData> {
    with_captured_transactions_options(f, AgentOptions::default())
}

/// Runs some code with a test agent built from the given options and returns
/// the completed transactions.
///
/// The agent is always active and its transport is replaced with a
/// [`TestTransport`].  The code runs in a fresh [`Registry`].
pub fn with_captured_transactions_options<F: FnOnce(), O: Into<AgentOptions>>(
    f: F,
    options: O,
) -> Vec<TransactionData> {
    let transport = TestTransport::new();
    let mut options = options.into();
    options.active = true;
    options.transport = Some(Arc::new(transport.clone()));
    Registry::run(
        Arc::new(Registry::new(Some(Arc::new(Agent::with_options(options))))),
        f,
    );
    transport.fetch_and_clear_transactions()
}
