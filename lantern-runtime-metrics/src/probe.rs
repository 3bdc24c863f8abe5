use std::fmt;

use lantern_core::{tags, GaugeSink, Tags};

use crate::introspection::{VmIntrospection, VmSnapshot};

/// A periodic measurement.
///
/// Probes are called from the [`ProbeRunner`](crate::ProbeRunner) thread once
/// per collection interval.
pub trait Probe: Send + 'static {
    /// Name of this probe for debugging and logging.
    fn name(&self) -> &'static str;

    /// Takes one measurement and reports it.
    fn call(&mut self);
}

#[derive(Debug, Default)]
struct Baseline {
    gc_count: Option<u64>,
    minor_gc_count: Option<u64>,
    major_gc_count: Option<u64>,
    allocated_objects: Option<u64>,
}

/// Reports runtime counters as gauges.
///
/// Absolute values are reported as they are read.  Counters that only grow
/// are reported as the difference to the previous call, so the first call
/// reports none of them.
///
/// | key | tags | value |
/// |-----|------|-------|
/// | `vm` | `metric=class_serial`, `metric=global_constant_state` | absolute |
/// | `thread_count` | | absolute |
/// | `gc_total_time` | | absolute |
/// | `heap_slots` | `metric=heap_live`, `metric=heap_free` | absolute |
/// | `gc_count` | `metric=gc_count`, `metric=minor_gc_count`, `metric=major_gc_count` | delta |
/// | `allocated_objects` | | delta |
pub struct VmProbe<I> {
    introspection: I,
    sink: Box<dyn GaugeSink>,
    baseline: Baseline,
}

impl<I: VmIntrospection> VmProbe<I> {
    /// Creates a probe reading `introspection` and reporting to `sink`.
    pub fn new<S: GaugeSink + 'static>(introspection: I, sink: S) -> VmProbe<I> {
        VmProbe {
            introspection,
            sink: Box::new(sink),
            baseline: Baseline::default(),
        }
    }

    /// Returns `true` if the introspection is available on this runtime.
    pub fn dependencies_present() -> bool {
        I::is_available()
    }

    /// Reads the counters and reports them.
    pub fn call(&mut self) {
        let snapshot = self.introspection.snapshot();
        self.report(&snapshot);
    }

    fn report(&mut self, snapshot: &VmSnapshot) {
        self.gauge("vm", snapshot.class_serial.map(|v| v as f64), &metric("class_serial"));
        self.gauge(
            "vm",
            snapshot.global_constant_state.map(|v| v as f64),
            &metric("global_constant_state"),
        );
        self.gauge("thread_count", snapshot.thread_count.map(|v| v as f64), &Tags::new());
        self.gauge("gc_total_time", snapshot.gc_total_time, &Tags::new());
        self.gauge("heap_slots", snapshot.heap_live.map(|v| v as f64), &metric("heap_live"));
        self.gauge("heap_slots", snapshot.heap_free.map(|v| v as f64), &metric("heap_free"));

        let gc_count = delta(&mut self.baseline.gc_count, snapshot.gc_count);
        self.gauge("gc_count", gc_count, &metric("gc_count"));
        let minor = delta(&mut self.baseline.minor_gc_count, snapshot.minor_gc_count);
        self.gauge("gc_count", minor, &metric("minor_gc_count"));
        let major = delta(&mut self.baseline.major_gc_count, snapshot.major_gc_count);
        self.gauge("gc_count", major, &metric("major_gc_count"));
        let allocated = delta(
            &mut self.baseline.allocated_objects,
            snapshot.total_allocated_objects,
        );
        self.gauge("allocated_objects", allocated, &Tags::new());
    }

    fn gauge(&self, key: &str, value: Option<f64>, tags: &Tags) {
        if let Some(value) = value {
            self.sink.set_gauge(key, value, tags);
        }
    }
}

impl<I: VmIntrospection> Probe for VmProbe<I> {
    fn name(&self) -> &'static str {
        "vm"
    }

    fn call(&mut self) {
        VmProbe::call(self)
    }
}

impl<I> fmt::Debug for VmProbe<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmProbe")
            .field("baseline", &self.baseline)
            .finish()
    }
}

fn metric(name: &str) -> Tags {
    tags([("metric", name)])
}

/// Difference to the previous reading.
///
/// A missing reading keeps the baseline.  A reading below the baseline means
/// the counter was reset: it becomes the new baseline and nothing is reported.
fn delta(baseline: &mut Option<u64>, current: Option<u64>) -> Option<f64> {
    let current = current?;
    let previous = baseline.replace(current)?;
    current.checked_sub(previous).map(|delta| delta as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta() {
        let mut baseline = None;
        assert_eq!(delta(&mut baseline, Some(10)), None);
        assert_eq!(delta(&mut baseline, Some(15)), Some(5.0));
        assert_eq!(delta(&mut baseline, None), None);
        assert_eq!(delta(&mut baseline, Some(15)), Some(0.0));
        assert_eq!(delta(&mut baseline, Some(3)), None);
        assert_eq!(baseline, Some(3));
        assert_eq!(delta(&mut baseline, Some(4)), Some(1.0));
    }
}
