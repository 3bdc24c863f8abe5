use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;
use crate::utils::{duration_seconds_float, option_ts_seconds_float, ts_seconds_float};

/// The format of an event body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    /// Free-form text.
    #[default]
    Plain,
    /// A SQL statement.
    Sql,
}

/// A timed record of work done within a [`Transaction`].
///
/// Events are created through [`Transaction::start_event`] and become
/// immutable once their [`EventGuard`] is stopped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dotted category name, for example `request.ureq`.
    pub name: String,
    /// Human readable title.
    pub title: String,
    /// Event body, often empty.
    pub body: String,
    /// The format of the body.
    pub body_format: BodyFormat,
    /// Wall clock start time.
    #[serde(with = "ts_seconds_float")]
    pub start: SystemTime,
    /// Duration of the event, `None` while the event is still open.
    #[serde(
        default,
        with = "duration_seconds_float",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    /// Wall clock end time, `start + duration` once stopped.
    #[serde(
        default,
        with = "option_ts_seconds_float",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<SystemTime>,
    /// Arbitrary key-value metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Event {
    pub(crate) fn new(name: &str, title: &str, body: &str, body_format: BodyFormat) -> Event {
        Event {
            name: name.into(),
            title: title.into(),
            body: body.into(),
            body_format,
            start: SystemTime::now(),
            duration: None,
            end: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Returns `true` if the event has not been stopped yet.
    pub fn is_open(&self) -> bool {
        self.duration.is_none()
    }

    /// Closes the event.  Stopping an event twice keeps the first duration.
    pub(crate) fn stop(&mut self, duration: Duration) {
        if self.is_open() {
            self.duration = Some(duration);
            self.end = Some(self.start + duration);
        }
    }
}

/// An open event that is stopped when dropped.
///
/// The guard is returned from [`Transaction::start_event`] and the
/// `start_event` functions of the global API.  Dropping the guard, or calling
/// [`EventGuard::stop`], records the duration of the event.  Guards returned
/// without an active transaction do nothing.
#[must_use = "the event is stopped as soon as the guard is dropped"]
pub struct EventGuard {
    inner: Option<OpenEvent>,
}

struct OpenEvent {
    transaction: Transaction,
    index: usize,
    started: Instant,
}

impl EventGuard {
    pub(crate) fn new(transaction: Transaction, index: usize) -> EventGuard {
        EventGuard {
            inner: Some(OpenEvent {
                transaction,
                index,
                started: Instant::now(),
            }),
        }
    }

    /// A guard that is not attached to any transaction.
    pub fn noop() -> EventGuard {
        EventGuard { inner: None }
    }

    /// Returns `true` if this guard records onto a transaction.
    pub fn is_recording(&self) -> bool {
        self.inner.is_some()
    }

    /// Adds metadata to the open event.
    pub fn set_metadata(&self, key: &str, value: &str) {
        if let Some(open) = &self.inner {
            open.transaction.update_event(open.index, |event| {
                event.metadata.insert(key.into(), value.into());
            });
        }
    }

    /// Stops the event, recording its duration.
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(open) = self.inner.take() {
            open.transaction.stop_event(open.index, open.started.elapsed());
        }
    }
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for EventGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventGuard")
            .field("recording", &self.is_recording())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_event_has_no_end() {
        let event = Event::new("query.sql", "Select users", "SELECT 1", BodyFormat::Sql);
        assert!(event.is_open());
        assert_eq!(event.end, None);
    }

    #[test]
    fn test_stopped_event_ends_after_start() {
        let mut event = Event::new("request.ureq", "GET http://example.com", "", BodyFormat::Plain);
        event.stop(Duration::from_millis(250));
        event.stop(Duration::from_secs(3));
        assert!(!event.is_open());
        assert_eq!(event.duration, Some(Duration::from_millis(250)));
        assert_eq!(event.end, Some(event.start + Duration::from_millis(250)));
    }

    #[test]
    fn test_noop_guard() {
        let guard = EventGuard::noop();
        assert!(!guard.is_recording());
        guard.set_metadata("key", "value");
        guard.stop();
    }
}
