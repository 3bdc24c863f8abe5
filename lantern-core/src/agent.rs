use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::metrics::{Gauge, GaugeSink, Tags};
use crate::transaction::TransactionData;
use crate::{AgentOptions, Registry, Transport};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

impl<T: Into<AgentOptions>> From<T> for Agent {
    fn from(o: T) -> Agent {
        Agent::with_options(o.into())
    }
}

type TransportSlot = RwLock<Option<Arc<dyn Transport>>>;

/// The lantern agent.
///
/// The agent holds the [`AgentOptions`] and the [`Transport`] that completed
/// transactions and gauges are handed to.  It is bound to a [`Registry`],
/// usually through [`init`](crate::init).
///
/// # Examples
///
/// ```
/// lantern_core::Agent::from(lantern_core::AgentOptions::default());
/// ```
pub struct Agent {
    options: AgentOptions,
    transport: TransportSlot,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("options", &self.options)
            .finish()
    }
}

impl Agent {
    /// Creates a new agent for the given options.
    ///
    /// Without a transport the agent is inactive.
    pub fn with_options(options: AgentOptions) -> Agent {
        // create the main registry eagerly, before any background thread can
        Registry::with(|_| {});

        let transport = options
            .transport
            .as_ref()
            .map(|factory| factory.create_transport(&options));
        if transport.is_none() {
            lantern_debug!("[Agent] no transport configured, agent is inactive");
        }
        Agent {
            options,
            transport: RwLock::new(transport),
        }
    }

    /// Returns the options of this agent.
    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Returns `true` if the agent records and sends transactions.
    pub fn is_active(&self) -> bool {
        self.options.active
            && self
                .transport
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hands a completed transaction to the transport.
    pub fn send_transaction(&self, transaction: TransactionData) {
        if let Some(transport) = self.transport() {
            lantern_debug!(
                "[Agent] sending transaction {} ({:?})",
                transaction.id,
                transaction.action
            );
            transport.send_transaction(transaction);
        } else {
            lantern_debug!("[Agent] no transport available, dropping transaction");
        }
    }

    /// Drains all pending data without shutting down.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        match self.transport() {
            Some(transport) => transport.flush(timeout.unwrap_or(SHUTDOWN_TIMEOUT)),
            None => true,
        }
    }

    /// Drains all pending data and shuts the transport down.
    ///
    /// After closing, the agent is inactive.
    pub fn close(&self, timeout: Option<Duration>) -> bool {
        let transport = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(transport) = transport {
            lantern_debug!("[Agent] shutting down transport");
            transport.shutdown(timeout.unwrap_or(SHUTDOWN_TIMEOUT))
        } else {
            true
        }
    }
}

impl GaugeSink for Agent {
    fn set_gauge(&self, key: &str, value: f64, tags: &Tags) {
        if !self.options.active {
            return;
        }
        if let Some(transport) = self.transport() {
            transport.send_gauge(Gauge::new(key, value, tags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestTransport;

    #[test]
    fn test_inactive_without_transport() {
        let agent = Agent::from(AgentOptions {
            active: true,
            transport: None,
            ..Default::default()
        });
        assert!(!agent.is_active());
    }

    #[test]
    fn test_close_deactivates() {
        let transport = TestTransport::new();
        let agent = Agent::from(AgentOptions {
            active: true,
            transport: Some(Arc::new(transport.clone())),
            ..Default::default()
        });
        assert!(agent.is_active());
        agent.set_gauge("thread_count", 4.0, &Tags::new());
        assert!(agent.close(None));
        assert!(!agent.is_active());
        agent.set_gauge("thread_count", 5.0, &Tags::new());
        let gauges = transport.fetch_and_clear_gauges();
        assert_eq!(gauges.len(), 1);
        assert_eq!(gauges[0].value, 4.0);
    }

    #[test]
    fn test_inactive_agent_drops_gauges() {
        let transport = TestTransport::new();
        let agent = Agent::from(AgentOptions {
            active: false,
            transport: Some(Arc::new(transport.clone())),
            ..Default::default()
        });
        agent.set_gauge("thread_count", 4.0, &Tags::new());
        assert!(transport.fetch_and_clear_gauges().is_empty());
    }
}
