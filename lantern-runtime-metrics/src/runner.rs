use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lantern_core::{lantern_debug, GaugeSink, Registry};

use crate::config::RuntimeMetricsConfig;
use crate::probe::Probe;

/// Calls probes on a background thread.
///
/// The thread wakes up once per collection interval and calls every probe in
/// the order they were registered.  It is stopped when the runner is dropped.
///
/// ```
/// use std::time::Duration;
/// use lantern_runtime_metrics::{ProbeRunner, RuntimeMetricsConfig};
///
/// let config = RuntimeMetricsConfig::new().with_interval(Duration::from_secs(30));
/// let runner = ProbeRunner::start(config);
/// drop(runner);
/// ```
pub struct ProbeRunner {
    shutdown: Sender<()>,
    probes: usize,
    handle: Option<JoinHandle<()>>,
}

impl ProbeRunner {
    /// Starts the runner, reporting process counters to the current registry.
    pub fn start(config: RuntimeMetricsConfig) -> ProbeRunner {
        ProbeRunner::start_with_sink(config, Registry::current())
    }

    /// Starts the runner, reporting process counters to `sink`.
    pub fn start_with_sink<S: GaugeSink + 'static>(
        config: RuntimeMetricsConfig,
        sink: S,
    ) -> ProbeRunner {
        let RuntimeMetricsConfig {
            collection_interval,
            collect_process,
            custom_probes,
        } = config;
        let mut probes = Vec::with_capacity(custom_probes.len() + 1);
        if collect_process {
            if let Some(probe) = process_probe(sink) {
                probes.push(probe);
            }
        }
        probes.extend(custom_probes);
        ProbeRunner::spawn(collection_interval, probes)
    }

    fn spawn(interval: Duration, mut probes: Vec<Box<dyn Probe>>) -> ProbeRunner {
        let (shutdown, receiver) = channel();
        let count = probes.len();
        let handle = if probes.is_empty() {
            None
        } else {
            thread::Builder::new()
                .name("lantern-probes".into())
                .spawn(move || loop {
                    match receiver.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            for probe in probes.iter_mut() {
                                call_probe(probe.as_mut());
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    }
                })
                .ok()
        };
        ProbeRunner {
            shutdown,
            probes: count,
            handle,
        }
    }

    /// Number of probes called by this runner.
    pub fn probe_count(&self) -> usize {
        self.probes
    }

    /// Returns `true` while the background thread runs.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ProbeRunner {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn call_probe(probe: &mut dyn Probe) {
    let name = probe.name();
    if panic::catch_unwind(AssertUnwindSafe(|| probe.call())).is_err() {
        lantern_debug!("[{}] probe panicked", name);
    }
}

#[cfg(feature = "process")]
fn process_probe<S: GaugeSink + 'static>(sink: S) -> Option<Box<dyn Probe>> {
    use crate::process::ProcessIntrospection;
    use crate::VmProbe;

    if !VmProbe::<ProcessIntrospection>::dependencies_present() {
        lantern_debug!("[vm] process introspection unavailable, probe skipped");
        return None;
    }
    Some(Box::new(VmProbe::new(ProcessIntrospection::new(), sink)))
}

#[cfg(not(feature = "process"))]
fn process_probe<S: GaugeSink + 'static>(_sink: S) -> Option<Box<dyn Probe>> {
    None
}

impl std::fmt::Debug for ProbeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRunner")
            .field("probes", &self.probes)
            .field("running", &self.is_running())
            .finish()
    }
}

