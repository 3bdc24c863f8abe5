//! Lantern instrumentation for outbound HTTP calls.
//!
//! HTTP clients report their calls to an [`OutboundInstrumentor`], which
//! records `request.<client>` and `response.<client>` events on the current
//! transaction.  Hooks put an instrumentor in place for a client, provided
//! the client library is available:
//!
//! ```
//! use lantern_outbound::{install_hook, instrumentor_for, CallData, OutboundHook};
//!
//! install_hook(&OutboundHook::new("example", || true));
//!
//! let instrumentor = instrumentor_for("example").unwrap();
//! let status = instrumentor.instrument(
//!     "example.request",
//!     &CallData::new("www.example.com").method("get"),
//!     || 200,
//! );
//! assert_eq!(status, 200);
//! ```
//!
//! # Features
//!
//! - `ureq`: the [`UreqInstrumentation`] middleware for `ureq` agents.

#![warn(missing_docs)]

mod hook;
mod instrumentor;
#[cfg(feature = "ureq")]
mod ureq;

pub use crate::hook::{install_hook, instrumentor_for, is_installed, Hook, OutboundHook};
pub use crate::instrumentor::{CallData, OutboundInstrumentor};
#[cfg(feature = "ureq")]
pub use crate::ureq::UreqInstrumentation;
