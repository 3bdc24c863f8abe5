use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::constants::MAX_EVENTS;
use crate::error::error_record_from;
use crate::event::{BodyFormat, Event, EventGuard};
use crate::utils::{filter_values, ts_seconds_float};
use crate::{Agent, Registry};

/// Parameters and session data as recorded on a transaction.
pub type Map = BTreeMap<String, serde_json::Value>;

/// The origin of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// An inbound HTTP request.
    HttpRequest,
    /// A background job.
    BackgroundJob,
    /// Any other, user defined namespace.
    Custom(String),
}

impl Namespace {
    /// The wire name of the namespace.
    pub fn as_str(&self) -> &str {
        match self {
            Namespace::HttpRequest => "http_request",
            Namespace::BackgroundJob => "background_job",
            Namespace::Custom(name) => name,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when parsing an empty namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("namespace must not be empty")]
pub struct ParseNamespaceError;

impl FromStr for Namespace {
    type Err = ParseNamespaceError;

    fn from_str(s: &str) -> Result<Namespace, ParseNamespaceError> {
        match s.trim() {
            "" => Err(ParseNamespaceError),
            "http_request" => Ok(Namespace::HttpRequest),
            "background_job" => Ok(Namespace::BackgroundJob),
            other => Ok(Namespace::Custom(other.to_owned())),
        }
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Namespace, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The error captured on a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The type name of the error.
    pub class: String,
    /// The error message.
    pub message: String,
    /// Backtrace lines, innermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backtrace: Vec<String>,
}

/// The serialized form of a transaction, as handed to the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    /// Unique id of the transaction.
    pub id: Uuid,
    /// Where the transaction originated.
    pub namespace: Namespace,
    /// The action name, for example `GET::Api#/users/:id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Recorded events in start order.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Filtered request parameters.
    #[serde(default)]
    pub params: Map,
    /// Filtered session data.
    #[serde(default)]
    pub session_data: Map,
    /// Selected environment entries of the request.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// The captured error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    /// When the request entered the serving queue, in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_start: Option<u64>,
    /// Wall clock start of the transaction.
    #[serde(with = "ts_seconds_float")]
    pub start: SystemTime,
    /// Whether the transaction has been completed.
    #[serde(default)]
    pub completed: bool,
}

impl TransactionData {
    fn new(namespace: Namespace) -> TransactionData {
        TransactionData {
            id: Uuid::new_v4(),
            namespace,
            action: None,
            events: Vec::new(),
            metadata: BTreeMap::new(),
            params: Map::new(),
            session_data: Map::new(),
            environment: BTreeMap::new(),
            error: None,
            queue_start: None,
            start: SystemTime::now(),
            completed: false,
        }
    }

    /// Returns all events with the given name.
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |event| event.name == name)
    }
}

struct TransactionInner {
    agent: Option<Arc<Agent>>,
    registry: Weak<Registry>,
    custom_action: bool,
    started: Instant,
    data: TransactionData,
}

/// A unit of monitored work: one request or one background job.
///
/// This is a cheap handle; clones refer to the same transaction.  All methods
/// become no-ops once the transaction has been [completed](Transaction::complete).
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Mutex<TransactionInner>>,
}

impl Transaction {
    pub(crate) fn new(
        agent: Option<Arc<Agent>>,
        registry: Weak<Registry>,
        namespace: Namespace,
    ) -> Transaction {
        Transaction {
            inner: Arc::new(Mutex::new(TransactionInner {
                agent,
                registry,
                custom_action: false,
                started: Instant::now(),
                data: TransactionData::new(namespace),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the data of a transaction that is not completed yet.
    fn with_open<F: FnOnce(&mut TransactionInner) -> R, R: Default>(&self, f: F) -> R {
        let mut inner = self.lock();
        if inner.data.completed {
            return R::default();
        }
        f(&mut inner)
    }

    /// Returns `true` if both handles refer to the same transaction.
    pub fn ptr_eq(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The unique id of the transaction.
    pub fn id(&self) -> Uuid {
        self.lock().data.id
    }

    /// The namespace of the transaction.
    pub fn namespace(&self) -> Namespace {
        self.lock().data.namespace.clone()
    }

    /// The current action name.
    pub fn action(&self) -> Option<String> {
        self.lock().data.action.clone()
    }

    /// Returns `true` once the transaction was completed.
    pub fn is_completed(&self) -> bool {
        self.lock().data.completed
    }

    /// Returns `true` if an error has been captured.
    pub fn has_error(&self) -> bool {
        self.lock().data.error.is_some()
    }

    /// A snapshot of the current state of the transaction.
    pub fn data(&self) -> TransactionData {
        self.lock().data.clone()
    }

    /// The serialized form of the current state of the transaction.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.data()).unwrap_or(serde_json::Value::Null)
    }

    /// Starts a new event.
    ///
    /// Events may be nested; the returned guard stops the event when dropped.
    pub fn start_event(
        &self,
        name: &str,
        title: &str,
        body: &str,
        body_format: BodyFormat,
    ) -> EventGuard {
        let index = self.with_open(|inner| {
            if inner.data.events.len() >= MAX_EVENTS {
                return Some(None);
            }
            inner
                .data
                .events
                .push(Event::new(name, title, body, body_format));
            Some(Some(inner.data.events.len() - 1))
        });
        match index {
            Some(Some(index)) => EventGuard::new(self.clone(), index),
            Some(None) => {
                lantern_debug!(
                    "[Transaction] event limit of {} reached, dropping {}",
                    MAX_EVENTS,
                    name
                );
                EventGuard::noop()
            }
            None => EventGuard::noop(),
        }
    }

    /// Runs `f` inside a new event and returns its result.
    pub fn instrument<F: FnOnce() -> R, R>(&self, name: &str, title: &str, body: &str, f: F) -> R {
        let _event = self.start_event(name, title, body, BodyFormat::Plain);
        f()
    }

    pub(crate) fn stop_event(&self, index: usize, elapsed: Duration) {
        self.with_open(|inner| {
            if let Some(event) = inner.data.events.get_mut(index) {
                event.stop(elapsed);
            }
        })
    }

    pub(crate) fn update_event<F: FnOnce(&mut Event)>(&self, index: usize, f: F) {
        self.with_open(|inner| {
            if let Some(event) = inner.data.events.get_mut(index) {
                if event.is_open() {
                    f(event);
                }
            }
        })
    }

    /// Sets an explicit action name.
    ///
    /// Actions set this way are never replaced by names inferred by the
    /// instrumentation (see [`Transaction::set_inferred_action`]).
    pub fn set_action(&self, action: &str) {
        self.with_open(|inner| {
            inner.data.action = Some(action.into());
            inner.custom_action = true;
        })
    }

    /// Sets an action name derived by the instrumentation.
    ///
    /// This has no effect once an explicit action was set.
    pub fn set_inferred_action(&self, action: &str) {
        self.with_open(|inner| {
            if !inner.custom_action {
                inner.data.action = Some(action.into());
            }
        })
    }

    /// Sets a single metadata entry.
    pub fn set_metadata(&self, key: &str, value: &str) {
        self.with_open(|inner| {
            inner.data.metadata.insert(key.into(), value.into());
        })
    }

    /// Merges request parameters into the transaction.
    ///
    /// Keys configured in `filter_parameters` are replaced with `[FILTERED]`.
    /// Nothing is recorded when `send_params` is disabled.
    pub fn set_params(&self, params: Map) {
        self.with_open(|inner| {
            let options = inner.agent.as_ref().map(|agent| agent.options());
            if options.is_some_and(|options| !options.send_params) {
                return;
            }
            let filter = options.map_or(&[][..], |options| &options.filter_parameters[..]);
            for (key, value) in params {
                let value = filter_values(&key, value, filter);
                inner.data.params.insert(key, value);
            }
        })
    }

    /// Merges session data into the transaction.
    ///
    /// Keys configured in `filter_session_data` are replaced with `[FILTERED]`.
    /// Nothing is recorded when `send_session_data` is disabled.
    pub fn set_session_data(&self, session: Map) {
        self.with_open(|inner| {
            let options = inner.agent.as_ref().map(|agent| agent.options());
            if options.is_some_and(|options| !options.send_session_data) {
                return;
            }
            let filter = options.map_or(&[][..], |options| &options.filter_session_data[..]);
            for (key, value) in session {
                let value = filter_values(&key, value, filter);
                inner.data.session_data.insert(key, value);
            }
        })
    }

    /// Merges environment entries into the transaction.
    pub fn set_environment<I, K, V>(&self, environment: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_open(|inner| {
            inner.data.environment.extend(
                environment
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into())),
            );
        })
    }

    /// Records when the request entered the serving queue, in milliseconds since the epoch.
    pub fn set_queue_start(&self, queue_start: u64) {
        self.with_open(|inner| {
            inner.data.queue_start = Some(queue_start);
        })
    }

    /// Captures an error.
    ///
    /// Only the first error is kept.  Errors whose class is listed in
    /// `ignore_errors` are dropped.
    pub fn set_error(&self, class: &str, message: &str, backtrace: Vec<String>) {
        self.set_error_record(ErrorRecord {
            class: class.into(),
            message: message.into(),
            backtrace,
        })
    }

    /// Captures a [`std::error::Error`], including its chain of sources.
    pub fn set_error_from<E: Error + ?Sized>(&self, error: &E) {
        let attach_backtrace = self
            .lock()
            .agent
            .as_ref()
            .is_some_and(|agent| agent.options().attach_backtrace);
        self.set_error_record(error_record_from(error, attach_backtrace))
    }

    fn set_error_record(&self, record: ErrorRecord) {
        let stored = self.with_open(|inner| {
            if inner.data.error.is_some() {
                return false;
            }
            let ignored = inner
                .agent
                .as_ref()
                .is_some_and(|agent| agent.options().ignore_errors.contains(&record.class));
            if ignored {
                return false;
            }
            inner.data.error = Some(record);
            true
        });
        if !stored {
            lantern_debug!("[Transaction] error not recorded");
        }
    }

    /// Completes the transaction and hands it to the transport.
    ///
    /// The transaction is removed from the registry it was started in.
    /// Completing a transaction twice has no further effect.
    pub fn complete(&self) {
        let (data, agent, registry) = {
            let mut inner = self.lock();
            if inner.data.completed {
                return;
            }
            inner.data.completed = true;
            let elapsed = inner.started.elapsed();
            let start = inner.data.start;
            for event in inner.data.events.iter_mut().filter(|event| event.is_open()) {
                let since_start = event.start.duration_since(start).unwrap_or_default();
                event.stop(elapsed.saturating_sub(since_start));
            }
            (inner.data.clone(), inner.agent.take(), inner.registry.upgrade())
        };

        if let Some(registry) = registry {
            registry.release_transaction(self);
        }

        let Some(agent) = agent else {
            return;
        };
        let ignored = data
            .action
            .as_ref()
            .is_some_and(|action| agent.options().ignore_actions.contains(action));
        if ignored {
            lantern_debug!("[Transaction] dropping ignored action {:?}", data.action);
            return;
        }
        let sent = panic::catch_unwind(AssertUnwindSafe(|| agent.send_transaction(data)));
        if sent.is_err() {
            lantern_debug!("[Transaction] transport panicked while sending");
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Transaction")
            .field("id", &inner.data.id)
            .field("namespace", &inner.data.namespace)
            .field("action", &inner.data.action)
            .field("completed", &inner.data.completed)
            .finish()
    }
}

/// The transaction of the current execution context, if any.
///
/// `Inactive` stands in when no transaction is running or the agent is not
/// active; every operation on it does nothing.
#[derive(Clone, Debug, Default)]
pub enum CurrentTransaction {
    /// A running transaction.
    Active(Transaction),
    /// No transaction.
    #[default]
    Inactive,
}

impl From<Transaction> for CurrentTransaction {
    fn from(transaction: Transaction) -> Self {
        CurrentTransaction::Active(transaction)
    }
}

impl From<Option<Transaction>> for CurrentTransaction {
    fn from(transaction: Option<Transaction>) -> Self {
        transaction.map_or(CurrentTransaction::Inactive, CurrentTransaction::Active)
    }
}

impl CurrentTransaction {
    /// Returns `true` for a running transaction.
    pub fn is_active(&self) -> bool {
        matches!(self, CurrentTransaction::Active(_))
    }

    /// The underlying transaction.
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            CurrentTransaction::Active(transaction) => Some(transaction),
            CurrentTransaction::Inactive => None,
        }
    }

    /// Consumes this into the underlying transaction.
    pub fn into_transaction(self) -> Option<Transaction> {
        match self {
            CurrentTransaction::Active(transaction) => Some(transaction),
            CurrentTransaction::Inactive => None,
        }
    }

    /// A snapshot of the transaction.
    pub fn data(&self) -> Option<TransactionData> {
        self.transaction().map(Transaction::data)
    }

    /// See [`Transaction::start_event`].
    pub fn start_event(
        &self,
        name: &str,
        title: &str,
        body: &str,
        body_format: BodyFormat,
    ) -> EventGuard {
        match self {
            CurrentTransaction::Active(transaction) => {
                transaction.start_event(name, title, body, body_format)
            }
            CurrentTransaction::Inactive => EventGuard::noop(),
        }
    }

    /// See [`Transaction::instrument`].
    pub fn instrument<F: FnOnce() -> R, R>(&self, name: &str, title: &str, body: &str, f: F) -> R {
        match self {
            CurrentTransaction::Active(transaction) => transaction.instrument(name, title, body, f),
            CurrentTransaction::Inactive => f(),
        }
    }

    /// See [`Transaction::set_action`].
    pub fn set_action(&self, action: &str) {
        if let Some(transaction) = self.transaction() {
            transaction.set_action(action)
        }
    }

    /// See [`Transaction::set_inferred_action`].
    pub fn set_inferred_action(&self, action: &str) {
        if let Some(transaction) = self.transaction() {
            transaction.set_inferred_action(action)
        }
    }

    /// See [`Transaction::set_metadata`].
    pub fn set_metadata(&self, key: &str, value: &str) {
        if let Some(transaction) = self.transaction() {
            transaction.set_metadata(key, value)
        }
    }

    /// See [`Transaction::set_params`].
    pub fn set_params(&self, params: Map) {
        if let Some(transaction) = self.transaction() {
            transaction.set_params(params)
        }
    }

    /// See [`Transaction::set_session_data`].
    pub fn set_session_data(&self, session: Map) {
        if let Some(transaction) = self.transaction() {
            transaction.set_session_data(session)
        }
    }

    /// See [`Transaction::set_environment`].
    pub fn set_environment<I, K, V>(&self, environment: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Some(transaction) = self.transaction() {
            transaction.set_environment(environment)
        }
    }

    /// See [`Transaction::set_queue_start`].
    pub fn set_queue_start(&self, queue_start: u64) {
        if let Some(transaction) = self.transaction() {
            transaction.set_queue_start(queue_start)
        }
    }

    /// See [`Transaction::set_error`].
    pub fn set_error(&self, class: &str, message: &str, backtrace: Vec<String>) {
        if let Some(transaction) = self.transaction() {
            transaction.set_error(class, message, backtrace)
        }
    }

    /// See [`Transaction::set_error_from`].
    pub fn set_error_from<E: Error + ?Sized>(&self, error: &E) {
        if let Some(transaction) = self.transaction() {
            transaction.set_error_from(error)
        }
    }

    /// See [`Transaction::complete`].
    pub fn complete(&self) {
        if let Some(transaction) = self.transaction() {
            transaction.complete()
        }
    }
}
