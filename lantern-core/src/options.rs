use std::borrow::Cow;
use std::env;
use std::fmt;
use std::sync::Arc;

use crate::constants::DEFAULT_REQUEST_HEADERS;
use crate::TransportFactory;

/// Raised by [`AgentOptions::from_env`] for malformed environment values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A boolean variable held something other than `true`, `false`, `1` or `0`.
    #[error("invalid boolean value {value:?} for {key}")]
    InvalidBool {
        /// The environment variable.
        key: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Configuration settings for the agent.
///
/// # Examples
///
/// ```
/// let _options = lantern_core::AgentOptions {
///     debug: true,
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct AgentOptions {
    /// Whether transactions are recorded at all.
    ///
    /// Defaults to the `LANTERN_ACTIVE` environment variable.
    pub active: bool,
    /// Enables debug mode.
    ///
    /// In debug mode debug information is printed to stderr.  With the
    /// `debug-logs` feature it is logged to the `lantern` target instead.
    pub debug: bool,
    /// The application name, from `LANTERN_APP_NAME`.
    pub name: Option<Cow<'static, str>>,
    /// The application environment, from `LANTERN_APP_ENV`.
    pub environment: Option<Cow<'static, str>>,
    /// Parameter keys whose values are replaced by `[FILTERED]`.
    pub filter_parameters: Vec<String>,
    /// Session keys whose values are replaced by `[FILTERED]`.
    pub filter_session_data: Vec<String>,
    /// Whether request parameters are recorded.
    pub send_params: bool,
    /// Whether session data is recorded.
    pub send_session_data: bool,
    /// Environment keys copied from the request, in `HTTP_*` form.
    pub request_headers: Vec<String>,
    /// Actions whose transactions are never sent.
    pub ignore_actions: Vec<String>,
    /// Error classes that are never recorded.
    pub ignore_errors: Vec<String>,
    /// Captures a native backtrace when recording errors.
    pub attach_backtrace: bool,
    /// The transport to use.
    pub transport: Option<Arc<dyn TransportFactory>>,
}

impl AgentOptions {
    /// Creates new options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a transport factory for the agent.
    #[must_use]
    pub fn transport<F>(mut self, factory: F) -> Self
    where
        F: TransportFactory + 'static,
    {
        self.transport = Some(Arc::new(factory));
        self
    }

    /// Reads options from the environment, failing on malformed values.
    ///
    /// [`Default`] reads the same variables but falls back to defaults for
    /// anything it cannot parse.
    pub fn from_env() -> Result<AgentOptions, ConfigError> {
        let mut options = AgentOptions::defaults();
        if let Some(active) = read_bool("LANTERN_ACTIVE")? {
            options.active = active;
        }
        if let Some(debug) = read_bool("LANTERN_DEBUG")? {
            options.debug = debug;
        }
        options.name = read_string("LANTERN_APP_NAME");
        options.environment = read_string("LANTERN_APP_ENV");
        Ok(options)
    }

    fn defaults() -> AgentOptions {
        AgentOptions {
            active: false,
            debug: false,
            name: None,
            environment: None,
            filter_parameters: vec![],
            filter_session_data: vec![],
            send_params: true,
            send_session_data: true,
            request_headers: DEFAULT_REQUEST_HEADERS
                .iter()
                .map(|header| header.to_string())
                .collect(),
            ignore_actions: vec![],
            ignore_errors: vec![],
            attach_backtrace: false,
            transport: None,
        }
    }
}

fn read_string(key: &'static str) -> Option<Cow<'static, str>> {
    env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Cow::Owned)
}

fn read_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    let Ok(value) = env::var(key) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" => Ok(Some(true)),
        "false" | "0" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidBool { key, value }),
    }
}

impl Default for AgentOptions {
    fn default() -> AgentOptions {
        let mut options = AgentOptions::defaults();
        options.active = read_bool("LANTERN_ACTIVE").ok().flatten().unwrap_or(false);
        options.debug = read_bool("LANTERN_DEBUG").ok().flatten().unwrap_or(false);
        options.name = read_string("LANTERN_APP_NAME");
        options.environment = read_string("LANTERN_APP_ENV");
        options
    }
}

impl fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct TransportFactory;

        f.debug_struct("AgentOptions")
            .field("active", &self.active)
            .field("debug", &self.debug)
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("filter_parameters", &self.filter_parameters)
            .field("filter_session_data", &self.filter_session_data)
            .field("send_params", &self.send_params)
            .field("send_session_data", &self.send_session_data)
            .field("request_headers", &self.request_headers)
            .field("ignore_actions", &self.ignore_actions)
            .field("ignore_errors", &self.ignore_errors)
            .field("attach_backtrace", &self.attach_backtrace)
            .field("transport", &self.transport.as_ref().map(|_| TransportFactory))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AgentOptions::defaults();
        assert!(options.send_params);
        assert!(options.send_session_data);
        assert!(options
            .request_headers
            .iter()
            .any(|header| header == "HTTP_ACCEPT"));
        assert!(format!("{:?}", options).contains("transport: None"));
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        env::set_var("LANTERN_DEBUG", "maybe");
        let result = AgentOptions::from_env();
        env::remove_var("LANTERN_DEBUG");
        assert_eq!(
            result.unwrap_err(),
            ConfigError::InvalidBool {
                key: "LANTERN_DEBUG",
                value: "maybe".into()
            }
        );
    }
}
