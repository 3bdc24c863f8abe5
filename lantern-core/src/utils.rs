//! Useful utilities for working with transactions.

use serde_json::Value;

use crate::constants::FILTERED;

/// Milliseconds since the epoch past which queue start values are taken to
/// be microseconds (the year 2100).
const QUEUE_START_US_THRESHOLD: u64 = 4_102_441_200_000;

/// Parse the types name from `Debug` output.
///
/// # Examples
///
/// ```
/// use lantern_core::utils::parse_type_from_debug;
///
/// let err = "NaN".parse::<usize>().unwrap_err();
/// assert_eq!(&parse_type_from_debug(&err), "ParseIntError");
/// ```
pub fn parse_type_from_debug<D: std::fmt::Debug + ?Sized>(d: &D) -> String {
    let dbg = format!("{:#?}", d);

    dbg.split(&[' ', '(', '{', '\r', '\n'][..])
        .next()
        .unwrap_or(&dbg)
        .trim()
        .to_owned()
}

/// Parses a queue start header value of the form `t=<ms>` into milliseconds.
///
/// Values that are only plausible as microseconds are converted.  Anything
/// malformed yields `None`.
///
/// ```
/// use lantern_core::utils::parse_queue_start;
///
/// assert_eq!(parse_queue_start("t=1000000"), Some(1_000_000));
/// assert_eq!(parse_queue_start("t=not-a-number"), None);
/// ```
pub fn parse_queue_start(value: &str) -> Option<u64> {
    let value = value.trim();
    let digits = value.strip_prefix("t=").unwrap_or(value);
    let mut queue_start: u64 = digits.parse().ok()?;
    if queue_start > QUEUE_START_US_THRESHOLD {
        queue_start /= 1_000;
    }
    Some(queue_start).filter(|ms| *ms > 0)
}

/// Replaces the values of filtered keys, recursing into nested maps and lists.
pub(crate) fn filter_values(key: &str, value: Value, filter: &[String]) -> Value {
    if filter.iter().any(|filtered| filtered == key) {
        return Value::String(FILTERED.into());
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let value = filter_values(&key, value, filter);
                    (key, value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| filter_values("", item, filter))
                .collect(),
        ),
        other => other,
    }
}

/// Serializes a `SystemTime` as fractional seconds since the epoch.
pub(crate) mod ts_seconds_float {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        serializer.serialize_f64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        let since_epoch = Duration::try_from_secs_f64(secs).map_err(de::Error::custom)?;
        Ok(UNIX_EPOCH + since_epoch)
    }
}

/// Serializes an optional `SystemTime` as fractional seconds since the epoch.
pub(crate) mod option_ts_seconds_float {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => {
                let secs = time
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs_f64();
                serializer.serialize_some(&secs)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SystemTime>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| {
                let since_epoch = Duration::try_from_secs_f64(secs).map_err(de::Error::custom)?;
                Ok(UNIX_EPOCH + since_epoch)
            })
            .transpose()
    }
}

/// Serializes an optional `Duration` as fractional seconds.
pub(crate) mod duration_seconds_float {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_type_from_debug() {
        use parse_type_from_debug as parse;
        #[derive(Debug)]
        struct MyStruct;
        assert_eq!(&parse(&MyStruct), "MyStruct");

        let err = "NaN".parse::<usize>().unwrap_err();
        assert_eq!(&parse(&err), "ParseIntError");

        let err = anyhow::Error::from(err);
        assert_eq!(&parse(&err), "ParseIntError");
    }

    #[test]
    fn test_queue_start() {
        assert_eq!(parse_queue_start("t=1000000"), Some(1_000_000));
        assert_eq!(parse_queue_start(" t=1389783600000 "), Some(1_389_783_600_000));
        assert_eq!(parse_queue_start("1389783600000"), Some(1_389_783_600_000));
        assert_eq!(
            parse_queue_start("t=1389783600000000"),
            Some(1_389_783_600_000)
        );
        assert_eq!(parse_queue_start("t=-1"), None);
        assert_eq!(parse_queue_start("t="), None);
        assert_eq!(parse_queue_start("t=0"), None);
        assert_eq!(parse_queue_start("garbage"), None);
    }

    #[test]
    fn test_filter_values() {
        let filter = vec!["password".to_owned()];
        let value = json!({
            "name": "lantern",
            "password": "secret",
            "nested": [{"password": "secret", "other": 1}]
        });
        assert_eq!(
            filter_values("user", value, &filter),
            json!({
                "name": "lantern",
                "password": "[FILTERED]",
                "nested": [{"password": "[FILTERED]", "other": 1}]
            })
        );
        assert_eq!(
            filter_values("password", json!({"a": 1}), &filter),
            json!("[FILTERED]")
        );
    }
}
