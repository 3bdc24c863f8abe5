//! Runtime metrics probes for lantern.
//!
//! A [`VmProbe`] reads runtime counters through a [`VmIntrospection`] and
//! reports them as gauges: absolute values such as the thread count as they
//! are, growing counters such as the allocation count as the difference to
//! the previous reading.
//!
//! The [`ProbeRunner`] calls probes on a background thread once per
//! collection interval.
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//! use lantern_runtime_metrics::{ProbeRunner, RuntimeMetricsConfig};
//!
//! let _guard = lantern_core::init(lantern_core::AgentOptions::new());
//! let _runner = ProbeRunner::start(
//!     RuntimeMetricsConfig::new().with_interval(Duration::from_secs(10)),
//! );
//! ```
//!
//! Install the [`CountingAllocator`] to also report allocation counters.
//!
//! # Features
//!
//! - `process`: the [`ProcessIntrospection`] of the current process
//!   (*enabled by default*).
//! - `jemalloc`: heap gauges from jemalloc statistics (Unix only).

#![warn(missing_docs)]

mod config;
mod introspection;
mod probe;
#[cfg(feature = "process")]
mod process;
mod runner;

pub use crate::config::RuntimeMetricsConfig;
pub use crate::introspection::{CountingAllocator, VmIntrospection, VmSnapshot};
pub use crate::probe::{Probe, VmProbe};
#[cfg(feature = "process")]
pub use crate::process::ProcessIntrospection;
pub use crate::runner::ProbeRunner;
