//! Tower middleware for the lantern APM client.
//!
//! [`JobLayer`] records a `background_job` transaction for every job handed
//! to a tower service, which makes it useful for job queues built on tower.
//! Each job runs in its own [`Registry`](lantern_core::Registry), so
//! transactions of concurrent jobs never share a slot.
//!
//! ```rust
//! # use tower::ServiceBuilder;
//! # use std::time::Duration;
//! # type Job = String;
//! use lantern_tower::JobLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(JobLayer::new(|job: &Job| format!("{}#perform", job)))
//!     .timeout(Duration::from_secs(30))
//!     .service(tower::service_fn(|job: Job| async move {
//!         lantern_core::set_metadata("queue", "default");
//!         Ok::<_, std::convert::Infallible>(job.len())
//!     }));
//! # drop(service);
//! ```
//!
//! ## HTTP
//!
//! The `http` feature (*enabled by default*) adds [`HttpLayer`], which records
//! a transaction for every `http::Request`: request metadata, parameters,
//! session data, queue time, errors returned by the inner service and the
//! time spent producing the response body.  [`ApiLayer`] is the variant for
//! routed API endpoints, naming transactions after the matched route.
//!
//! ```rust
//! # #[cfg(feature = "http")] {
//! use lantern_tower::{ApiEndpoint, ApiLayer, HttpLayer};
//!
//! let http = HttpLayer::new().instrument_event_name("process_action.http");
//! let api = ApiLayer::new(ApiEndpoint::new("Shop::Api").namespace("v1").path("orders"));
//! # drop((http, api));
//! # }
//! ```
//!
//! `HttpLayer` binds its own registry for the requests it owns.  Stacked HTTP
//! layers share the transaction of the outermost one.

#![warn(missing_docs)]

use lantern_core::Transaction;

#[cfg(feature = "http")]
mod api;
#[cfg(feature = "http")]
mod body;
#[cfg(feature = "http")]
mod http;
mod job;
#[cfg(feature = "http")]
mod request;
#[cfg(feature = "http")]
pub use crate::api::*;
#[cfg(feature = "http")]
pub use crate::body::*;
#[cfg(feature = "http")]
pub use crate::http::*;
pub use crate::job::*;
#[cfg(feature = "http")]
pub use crate::request::*;

/// Completes a transaction when dropped.
pub(crate) struct Completion(Option<Transaction>);

impl Completion {
    pub(crate) fn new(transaction: Transaction) -> Self {
        Completion(Some(transaction))
    }

    pub(crate) fn transaction(&self) -> Option<&Transaction> {
        self.0.as_ref()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(transaction) = self.0.take() {
            transaction.complete();
        }
    }
}
