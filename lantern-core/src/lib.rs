//! This crate provides the core of the lantern APM client: transactions,
//! timed events and the registry that tracks the transaction of the current
//! execution context.
//!
//! `lantern-core` is meant for integration authors that want to instrument
//! frameworks or libraries.  The HTTP middleware lives in `lantern-tower`,
//! outbound call instrumentation in `lantern-outbound` and runtime metrics in
//! `lantern-runtime-metrics`.
//!
//! # Core Concepts
//!
//! A [`Transaction`] aggregates the work done for one request or background
//! job: an ordered list of [`Event`]s, metadata, parameters, session data and
//! at most one error.  It is completed exactly once, after which it is handed
//! to the [`Transport`] of the bound [`Agent`].
//!
//! The [`Registry`] holds the agent and the current transaction.  When no
//! active agent is bound, every operation works on
//! [`CurrentTransaction::Inactive`] and does nothing.
//!
//! # Parallelism, Concurrency and Async
//!
//! Every thread has its own registry, so the current transaction of one thread
//! is never seen by another.  Futures that move between threads carry their
//! registry along when bound with [`RegistryFutureExt::bind_registry`].
//!
//! ```rust
//! use std::sync::Arc;
//! use lantern_core::{Registry, RegistryFutureExt};
//!
//! let registry = Arc::new(Registry::new_from_top(Registry::current()));
//! let future = async {
//!     let transaction = lantern_core::start_transaction(lantern_core::Namespace::BackgroundJob);
//!     lantern_core::instrument("work.job", "Work", "", || 1 + 1);
//!     transaction.complete();
//! }
//! .bind_registry(registry);
//! # drop(future);
//! ```
//!
//! # Features
//!
//! - `backtrace`: captures native backtraces for errors when
//!   [`AgentOptions::attach_backtrace`] is set (*enabled by default*).
//! - `debug-logs`: routes debug output through the `log` crate.
//! - `test`: enables the [`test`] module.

#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
mod macros;

mod agent;
mod api;
#[cfg(feature = "backtrace")]
mod backtrace_support;
mod constants;
mod error;
mod event;
mod futures;
mod init;
mod metrics;
mod options;
mod registry;
mod transaction;
mod transport;
pub mod utils;

// public api or exports from this crate
pub use crate::agent::Agent;
pub use crate::api::*;
#[cfg(feature = "backtrace")]
pub use crate::backtrace_support::{backtrace_to_lines, current_backtrace};
pub use crate::constants::{DEFAULT_REQUEST_HEADERS, FILTERED, MAX_EVENTS};
pub use crate::error::error_record_from;
pub use crate::event::{BodyFormat, Event, EventGuard};
pub use crate::futures::{RegistryFuture, RegistryFutureExt};
pub use crate::init::{init, AgentGuard};
pub use crate::metrics::{tags, Gauge, GaugeSink, Tags};
pub use crate::options::{AgentOptions, ConfigError};
pub use crate::registry::{Registry, SwitchGuard};
pub use crate::transaction::{
    CurrentTransaction, ErrorRecord, Map, Namespace, ParseNamespaceError, Transaction,
    TransactionData,
};
pub use crate::transport::{Transport, TransportFactory};

#[doc(hidden)]
pub use crate::macros::__debug_log;

// test utilities
#[cfg(any(test, feature = "test"))]
pub mod test;
