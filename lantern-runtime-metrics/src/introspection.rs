//! Sources of runtime counters.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Runtime counters read at one point in time.
///
/// Counters a runtime does not expose are `None` and produce no gauge.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VmSnapshot {
    /// Serial number of the type cache.
    pub class_serial: Option<u64>,
    /// Serial number of the global constant cache.
    pub global_constant_state: Option<u64>,
    /// Number of live threads.
    pub thread_count: Option<u64>,
    /// Total time spent collecting garbage, in milliseconds.
    pub gc_total_time: Option<f64>,
    /// Number of occupied heap slots.
    pub heap_live: Option<u64>,
    /// Number of free heap slots.
    pub heap_free: Option<u64>,
    /// Number of collector runs since start.
    pub gc_count: Option<u64>,
    /// Number of minor collector runs since start.
    pub minor_gc_count: Option<u64>,
    /// Number of major collector runs since start.
    pub major_gc_count: Option<u64>,
    /// Number of objects allocated since start.
    pub total_allocated_objects: Option<u64>,
}

/// Introspection of the host runtime.
pub trait VmIntrospection: Send + 'static {
    /// Returns `true` if the runtime exposes the counters this reads.
    ///
    /// This must not have side effects.
    fn is_available() -> bool
    where
        Self: Sized;

    /// Reads the current counters.
    fn snapshot(&mut self) -> VmSnapshot;
}

static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static ALLOCATOR_INSTALLED: AtomicBool = AtomicBool::new(false);

/// A global allocator counting allocations of the wrapped allocator.
///
/// Install it to report `allocated_objects` and `heap_slots{metric=heap_live}`:
///
/// ```
/// use lantern_runtime_metrics::CountingAllocator;
///
/// #[global_allocator]
/// static GLOBAL: CountingAllocator = CountingAllocator::new();
/// # fn main() {}
/// ```
#[derive(Debug, Default)]
pub struct CountingAllocator<A = System> {
    inner: A,
}

impl CountingAllocator {
    /// Wraps the system allocator.
    pub const fn new() -> CountingAllocator {
        CountingAllocator { inner: System }
    }

    /// Returns `true` once a counting allocator served an allocation.
    pub fn is_installed() -> bool {
        ALLOCATOR_INSTALLED.load(Ordering::Relaxed)
    }

    /// Number of allocations since start.
    pub fn allocations() -> u64 {
        ALLOCATIONS.load(Ordering::Relaxed)
    }

    /// Number of allocations not yet freed.
    pub fn live() -> u64 {
        ALLOCATIONS
            .load(Ordering::Relaxed)
            .saturating_sub(DEALLOCATIONS.load(Ordering::Relaxed))
    }
}

impl<A> CountingAllocator<A> {
    /// Wraps another allocator.
    pub const fn wrap(inner: A) -> CountingAllocator<A> {
        CountingAllocator { inner }
    }
}

fn count_alloc() {
    if !ALLOCATOR_INSTALLED.load(Ordering::Relaxed) {
        ALLOCATOR_INSTALLED.store(true, Ordering::Relaxed);
    }
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}

// SAFETY: every call is forwarded unchanged to the wrapped allocator.
unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            count_alloc();
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            count_alloc();
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        self.inner.dealloc(ptr, layout)
    }

    // a reallocation moves an object, it does not create one
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.inner.realloc(ptr, layout, new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_missing_counters_as_null() {
        let snapshot = VmSnapshot {
            thread_count: Some(3),
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["thread_count"], 3);
        assert!(json["gc_count"].is_null());
    }

    #[test]
    fn test_counting_allocator_forwards() {
        let allocator = CountingAllocator::new();
        let layout = Layout::from_size_align(16, 8).unwrap();
        let before = CountingAllocator::allocations();
        unsafe {
            let ptr = allocator.alloc(layout);
            assert!(!ptr.is_null());
            allocator.dealloc(ptr, layout);
        }
        assert!(CountingAllocator::allocations() > before);
        assert!(CountingAllocator::is_installed());
    }
}
