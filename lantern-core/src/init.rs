use std::sync::Arc;

use crate::{Agent, Registry};

/// Helper struct that is returned from [`init`].
///
/// When this is dropped pending data is flushed and the transport is shut
/// down.
#[must_use = "when the init guard is dropped the transport will be shut down and no further \
              transactions can be sent.  If you do want to ignore this use mem::forget on it."]
pub struct AgentGuard(Arc<Agent>);

impl AgentGuard {
    /// Quick check if the agent is active.
    pub fn is_active(&self) -> bool {
        self.0.is_active()
    }

    /// The initialized agent.
    pub fn agent(&self) -> &Arc<Agent> {
        &self.0
    }
}

impl Drop for AgentGuard {
    fn drop(&mut self) {
        if self.is_active() {
            lantern_debug!("dropping agent guard -> disposing agent");
        } else {
            lantern_debug!("dropping agent guard (no agent to dispose)");
        }
        self.0.flush(None);
        self.0.close(None);
    }
}

/// Creates the lantern agent for a given configuration and binds it.
///
/// The agent is bound to the current registry.  Called on the main thread
/// before any other thread is spawned, every thread started afterwards
/// inherits it.
///
/// # Examples
///
/// ```
/// let _lantern = lantern_core::init(lantern_core::AgentOptions {
///     name: Some("my-app".into()),
///     ..Default::default()
/// });
/// ```
pub fn init<A: Into<Agent>>(config: A) -> AgentGuard {
    let agent = Arc::new(config.into());
    Registry::with(|registry| registry.bind_agent(Some(agent.clone())));
    if agent.is_active() {
        lantern_debug!("enabled lantern agent {:?}", agent.options().name);
    } else {
        lantern_debug!("initialized inactive lantern agent");
    }
    AgentGuard(agent)
}
