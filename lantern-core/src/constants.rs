/// Replacement value for filtered parameters and session entries.
pub const FILTERED: &str = "[FILTERED]";

/// Maximum number of events recorded on a single transaction.
pub const MAX_EVENTS: usize = 2_000;

/// Request headers copied into the transaction environment by default.
pub const DEFAULT_REQUEST_HEADERS: &[&str] = &[
    "HTTP_ACCEPT",
    "HTTP_ACCEPT_CHARSET",
    "HTTP_ACCEPT_ENCODING",
    "HTTP_ACCEPT_LANGUAGE",
    "HTTP_CACHE_CONTROL",
    "HTTP_CONNECTION",
    "CONTENT_LENGTH",
    "PATH_INFO",
    "HTTP_RANGE",
    "REQUEST_METHOD",
    "REQUEST_PATH",
    "SERVER_NAME",
    "SERVER_PORT",
    "SERVER_PROTOCOL",
];
