use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Gauge;
use crate::transaction::TransactionData;
use crate::AgentOptions;

/// The trait for transports.
///
/// A transport is responsible for shipping completed transactions and gauge
/// observations to the monitoring backend.  Delivery is fire and forget:
/// `send_transaction` must not block on the network.
pub trait Transport: Send + Sync + 'static {
    /// Sends a completed transaction.
    fn send_transaction(&self, transaction: TransactionData);

    /// Sends a gauge observation.
    fn send_gauge(&self, gauge: Gauge) {
        let _ = gauge;
    }

    /// Drains the queue if there is one.
    ///
    /// Returns `true` if the queue was drained within `timeout`.
    fn flush(&self, timeout: Duration) -> bool {
        let _ = timeout;
        true
    }

    /// Instructs the transport to shut down.
    fn shutdown(&self, timeout: Duration) -> bool {
        self.flush(timeout)
    }
}

/// A factory creating transport instances.
///
/// It is implemented for closures taking the [`AgentOptions`] and for
/// `Arc<T: Transport>`, which hands out clones of the same transport.
pub trait TransportFactory: Send + Sync {
    /// Given some [`AgentOptions`], create a transport.
    fn create_transport(&self, options: &AgentOptions) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&AgentOptions) -> Arc<dyn Transport> + Clone + Send + Sync + 'static,
{
    fn create_transport(&self, options: &AgentOptions) -> Arc<dyn Transport> {
        (*self)(options)
    }
}

impl<T: Transport> Transport for Arc<T> {
    fn send_transaction(&self, transaction: TransactionData) {
        (**self).send_transaction(transaction)
    }

    fn send_gauge(&self, gauge: Gauge) {
        (**self).send_gauge(gauge)
    }

    fn flush(&self, timeout: Duration) -> bool {
        (**self).flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        (**self).shutdown(timeout)
    }
}

impl<T: Transport> TransportFactory for Arc<T> {
    fn create_transport(&self, _options: &AgentOptions) -> Arc<dyn Transport> {
        self.clone()
    }
}
