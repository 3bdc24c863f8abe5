use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::utils::ts_seconds_float;

/// Tags attached to a gauge observation.
pub type Tags = BTreeMap<String, String>;

/// A single gauge observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    /// The gauge key, for example `thread_count`.
    pub key: String,
    /// The observed value.
    pub value: f64,
    /// Tags distinguishing series of the same key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
    /// When the value was observed.
    #[serde(with = "ts_seconds_float")]
    pub timestamp: SystemTime,
}

impl Gauge {
    /// Creates a gauge observed now.
    pub fn new(key: &str, value: f64, tags: &Tags) -> Gauge {
        Gauge {
            key: key.into(),
            value,
            tags: tags.clone(),
            timestamp: SystemTime::now(),
        }
    }
}

/// Receives gauge observations.
pub trait GaugeSink: Send + Sync {
    /// Records the value of a gauge.
    fn set_gauge(&self, key: &str, value: f64, tags: &Tags);
}

impl<T: GaugeSink + ?Sized> GaugeSink for Arc<T> {
    fn set_gauge(&self, key: &str, value: f64, tags: &Tags) {
        (**self).set_gauge(key, value, tags)
    }
}

/// Builds a tag map from key-value pairs.
///
/// ```
/// let tags = lantern_core::tags([("metric", "heap_live")]);
/// assert_eq!(tags["metric"], "heap_live");
/// ```
pub fn tags<I, K, V>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
