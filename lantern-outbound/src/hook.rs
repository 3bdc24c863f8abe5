//! Installation of client hooks.
//!
//! A hook is installed at most once per process and only when the library it
//! instruments is available.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError, RwLock};

use lantern_core::lantern_debug;

use crate::instrumentor::OutboundInstrumentor;

static INSTALLED: LazyLock<Mutex<HashSet<&'static str>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

static CLIENT_DEFAULTS: LazyLock<RwLock<HashMap<String, OutboundInstrumentor>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Hook abstraction.
///
/// A hook wires instrumentation into a third party library.  Whether that
/// library is present is answered by [`Hook::dependencies_present`], which
/// must not have side effects.
pub trait Hook: Send + Sync {
    /// Name of this hook, unique per process.
    fn name(&self) -> &'static str;

    /// Returns `true` if the instrumented library is available.
    fn dependencies_present(&self) -> bool;

    /// Installs the hook.  Called at most once through [`install_hook`].
    fn install(&self);
}

/// Installs a hook unless it is already installed or its dependencies are
/// missing.
///
/// Returns `true` if the hook was installed by this call.
pub fn install_hook<H: Hook + ?Sized>(hook: &H) -> bool {
    if !hook.dependencies_present() {
        lantern_debug!("[{}] dependencies missing, hook not installed", hook.name());
        return false;
    }
    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    if !installed.insert(hook.name()) {
        return false;
    }
    lantern_debug!("[{}] installing hook", hook.name());
    hook.install();
    true
}

/// Returns `true` if a hook with this name has been installed.
pub fn is_installed(name: &str) -> bool {
    INSTALLED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(name)
}

/// Returns the instrumentor installed for a client.
pub fn instrumentor_for(client: &str) -> Option<OutboundInstrumentor> {
    CLIENT_DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(client)
        .cloned()
}

/// A hook that installs an [`OutboundInstrumentor`] as the default of an
/// HTTP client.
#[derive(Clone)]
pub struct OutboundHook {
    client: &'static str,
    detect: fn() -> bool,
}

impl OutboundHook {
    /// Creates a hook for `client`, present whenever `detect` returns `true`.
    pub fn new(client: &'static str, detect: fn() -> bool) -> OutboundHook {
        OutboundHook { client, detect }
    }

    /// The hook for the `ureq` client, present with the `ureq` feature.
    pub fn ureq() -> OutboundHook {
        OutboundHook::new("ureq", || cfg!(feature = "ureq"))
    }
}

impl fmt::Debug for OutboundHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundHook")
            .field("client", &self.client)
            .field("present", &self.dependencies_present())
            .finish()
    }
}

impl Hook for OutboundHook {
    fn name(&self) -> &'static str {
        self.client
    }

    fn dependencies_present(&self) -> bool {
        (self.detect)()
    }

    fn install(&self) {
        CLIENT_DEFAULTS
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.client.into(), OutboundInstrumentor::new(self.client));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingHook {
        name: &'static str,
        present: bool,
        installs: AtomicUsize,
    }

    impl Hook for CountingHook {
        fn name(&self) -> &'static str {
            self.name
        }

        fn dependencies_present(&self) -> bool {
            self.present
        }

        fn install(&self) {
            self.installs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_install_once() {
        let hook = CountingHook {
            name: "counting-once",
            present: true,
            installs: AtomicUsize::new(0),
        };
        assert!(install_hook(&hook));
        assert!(!install_hook(&hook));
        assert_eq!(hook.installs.load(Ordering::SeqCst), 1);
        assert!(is_installed("counting-once"));
    }

    #[test]
    fn test_skip_missing_dependencies() {
        let hook = CountingHook {
            name: "counting-missing",
            present: false,
            installs: AtomicUsize::new(0),
        };
        assert!(!install_hook(&hook));
        assert_eq!(hook.installs.load(Ordering::SeqCst), 0);
        assert!(!is_installed("counting-missing"));
    }

    #[test]
    fn test_ureq_presence_follows_feature() {
        assert_eq!(OutboundHook::ureq().dependencies_present(), cfg!(feature = "ureq"));
    }
}
