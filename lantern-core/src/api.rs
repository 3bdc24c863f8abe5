use std::error::Error;

use crate::event::{BodyFormat, EventGuard};
use crate::metrics::Tags;
use crate::transaction::{CurrentTransaction, Namespace};
use crate::Registry;

/// Starts a transaction in the current registry.
///
/// If a transaction is already running in this execution context it is
/// returned instead.  When no active agent is bound this returns
/// [`CurrentTransaction::Inactive`].
///
/// # Example
///
/// ```
/// use lantern_core::{start_transaction, Namespace};
///
/// let transaction = start_transaction(Namespace::BackgroundJob);
/// transaction.set_action("Mailer#deliver");
/// transaction.complete();
/// ```
pub fn start_transaction(namespace: Namespace) -> CurrentTransaction {
    Registry::with(|registry| registry.start_transaction(namespace))
}

/// Returns the transaction of the current execution context.
pub fn current_transaction() -> CurrentTransaction {
    Registry::with(|registry| registry.current_transaction())
}

/// Starts an event on the current transaction.
///
/// # Example
///
/// ```
/// use lantern_core::{start_event, BodyFormat};
///
/// let event = start_event("sql.query", "Fetch users", "SELECT * FROM users", BodyFormat::Sql);
/// // run the query
/// event.stop();
/// ```
pub fn start_event(name: &str, title: &str, body: &str, body_format: BodyFormat) -> EventGuard {
    current_transaction().start_event(name, title, body, body_format)
}

/// Runs `f` inside an event on the current transaction.
///
/// The result of `f` is returned unchanged, whether or not a transaction
/// is running.
pub fn instrument<F: FnOnce() -> R, R>(name: &str, title: &str, body: &str, f: F) -> R {
    current_transaction().instrument(name, title, body, f)
}

/// Sets a custom action on the current transaction.
pub fn set_action(action: &str) {
    current_transaction().set_action(action)
}

/// Sets metadata on the current transaction.
pub fn set_metadata(key: &str, value: &str) {
    current_transaction().set_metadata(key, value)
}

/// Records an error on the current transaction.
///
/// # Example
///
/// ```
/// let err = "NaN".parse::<usize>().unwrap_err();
/// lantern_core::set_error_from(&err);
/// ```
pub fn set_error_from<E: Error + ?Sized>(error: &E) {
    current_transaction().set_error_from(error)
}

/// Completes the current transaction.
pub fn complete_current() {
    current_transaction().complete()
}

/// Emits a gauge through the agent of the current registry.
pub fn set_gauge(key: &str, value: f64, tags: &Tags) {
    Registry::with(|registry| registry.set_gauge(key, value, tags))
}
