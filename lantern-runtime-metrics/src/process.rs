use crate::introspection::{CountingAllocator, VmIntrospection, VmSnapshot};

/// Reads counters of the current process.
///
/// The thread count comes from `/proc/self/task`.  Allocation counters are
/// only reported when a [`CountingAllocator`] is the global allocator.  With
/// the `jemalloc` feature the heap gauges report jemalloc's allocated bytes
/// as `heap_live` and resident but unallocated bytes as `heap_free`.  Rust
/// has no garbage collector, so the collector counters stay empty.
#[derive(Debug, Default)]
pub struct ProcessIntrospection {
    _private: (),
}

impl ProcessIntrospection {
    /// Creates a new process introspection.
    pub fn new() -> ProcessIntrospection {
        ProcessIntrospection::default()
    }
}

impl VmIntrospection for ProcessIntrospection {
    fn is_available() -> bool {
        cfg!(any(target_os = "linux", all(feature = "jemalloc", unix)))
    }

    fn snapshot(&mut self) -> VmSnapshot {
        let mut snapshot = VmSnapshot {
            thread_count: thread_count(),
            ..Default::default()
        };
        if CountingAllocator::is_installed() {
            snapshot.total_allocated_objects = Some(CountingAllocator::allocations());
            snapshot.heap_live = Some(CountingAllocator::live());
        }
        #[cfg(all(feature = "jemalloc", unix))]
        if let Some((allocated, resident)) = jemalloc_stats() {
            snapshot.heap_live = Some(allocated);
            snapshot.heap_free = Some(resident.saturating_sub(allocated));
        }
        snapshot
    }
}

#[cfg(all(feature = "jemalloc", unix))]
fn jemalloc_stats() -> Option<(u64, u64)> {
    use tikv_jemalloc_ctl::{epoch, stats};

    // statistics are cached until the epoch advances
    epoch::advance().ok()?;
    let allocated = stats::allocated::read().ok()? as u64;
    let resident = stats::resident::read().ok()? as u64;
    Some((allocated, resident))
}

#[cfg(target_os = "linux")]
fn thread_count() -> Option<u64> {
    let entries = std::fs::read_dir("/proc/self/task").ok()?;
    Some(entries.count() as u64)
}

#[cfg(not(target_os = "linux"))]
fn thread_count() -> Option<u64> {
    None
}
