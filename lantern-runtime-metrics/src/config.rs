//! Configuration for the probe runner.

use std::fmt;
use std::time::Duration;

use crate::probe::Probe;

/// Configuration for the [`ProbeRunner`](crate::ProbeRunner).
pub struct RuntimeMetricsConfig {
    /// How often the probes are called.
    ///
    /// Default: 60 seconds
    pub collection_interval: Duration,

    /// Report counters of the current process with a
    /// [`VmProbe`](crate::VmProbe).
    ///
    /// Default: true (when the `process` feature is enabled)
    pub collect_process: bool,

    /// Additional probes to call.
    pub custom_probes: Vec<Box<dyn Probe>>,
}

impl Default for RuntimeMetricsConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(60),
            collect_process: true,
            custom_probes: Vec::new(),
        }
    }
}

impl RuntimeMetricsConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the collection interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.collection_interval = interval;
        self
    }

    /// Enables or disables the process probe.
    #[must_use]
    pub fn with_process_metrics(mut self, enabled: bool) -> Self {
        self.collect_process = enabled;
        self
    }

    /// Adds a custom probe.
    #[must_use]
    pub fn add_probe<P: Probe>(mut self, probe: P) -> Self {
        self.custom_probes.push(Box::new(probe));
        self
    }
}

impl fmt::Debug for RuntimeMetricsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeMetricsConfig")
            .field("collection_interval", &self.collection_interval)
            .field("collect_process", &self.collect_process)
            .field(
                "custom_probes",
                &self.custom_probes.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
