use std::collections::BTreeMap;

use http::header::{HeaderMap, HOST};
use http::{Extensions, Method, Request, Uri};
use lantern_core::utils::parse_queue_start;
use lantern_core::Map;

/// The parts of a request the instrumentation reads.
///
/// The body is never inspected.
#[derive(Clone, Copy, Debug)]
pub struct RequestHead<'a> {
    /// The request method.
    pub method: &'a Method,
    /// The request URI.
    pub uri: &'a Uri,
    /// The request headers.
    pub headers: &'a HeaderMap,
    /// The request extensions.
    pub extensions: &'a Extensions,
}

impl<'a> RequestHead<'a> {
    /// Borrows the head of a request.
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        RequestHead {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
            extensions: request.extensions(),
        }
    }

    /// The value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Session data of a request.
///
/// Session middleware can insert this into the request extensions so that
/// [`DefaultRequest`] records it on the transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionData(pub Map);

/// Reads request data for the transaction.
///
/// Implement this to change how the method, path, parameters and session of
/// a request are determined, for example to read already parsed parameters
/// from a framework specific extension.
pub trait RequestAccessor: Clone + Send + Sync + 'static {
    /// The request method.
    fn method(&self, head: &RequestHead<'_>) -> String {
        head.method.as_str().to_owned()
    }

    /// The request path.
    fn path(&self, head: &RequestHead<'_>) -> String {
        head.uri.path().to_owned()
    }

    /// The request parameters.
    fn params(&self, head: &RequestHead<'_>) -> Map;

    /// The session data.
    fn session(&self, head: &RequestHead<'_>) -> Map;
}

/// Reads parameters from the query string and session data from the
/// [`SessionData`] extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRequest;

impl RequestAccessor for DefaultRequest {
    fn params(&self, head: &RequestHead<'_>) -> Map {
        query_params(head.uri)
    }

    fn session(&self, head: &RequestHead<'_>) -> Map {
        head.extensions
            .get::<SessionData>()
            .map(|session| session.0.clone())
            .unwrap_or_default()
    }
}

/// Parses the query string of a URI into parameters.
pub fn query_params(uri: &Uri) -> Map {
    let Some(query) = uri.query() else {
        return Map::new();
    };
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned().into()))
        .collect()
}

/// Builds the transaction environment of a request.
///
/// `REQUEST_METHOD`, `PATH_INFO`, `QUERY_STRING` and `SERVER_NAME` are always
/// included.  Headers are added in their `HTTP_*` form when listed in
/// `request_headers`.
pub fn request_environment(
    head: &RequestHead<'_>,
    request_headers: &[String],
) -> BTreeMap<String, String> {
    let mut environment = BTreeMap::new();
    environment.insert("REQUEST_METHOD".to_owned(), head.method.to_string());
    environment.insert("PATH_INFO".to_owned(), head.uri.path().to_owned());
    if let Some(query) = head.uri.query() {
        environment.insert("QUERY_STRING".to_owned(), query.to_owned());
    }
    let server_name = head
        .uri
        .host()
        .map(str::to_owned)
        .or_else(|| {
            head.header(HOST.as_str())
                .map(|host| host.split(':').next().unwrap_or(host).to_owned())
        });
    if let Some(server_name) = server_name {
        environment.insert("SERVER_NAME".to_owned(), server_name);
    }

    for (name, value) in head.headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let key = env_key(name.as_str());
        if request_headers.iter().any(|header| *header == key) {
            environment.insert(key, value.to_owned());
        }
    }
    environment
}

fn env_key(header: &str) -> String {
    let upper = header.to_ascii_uppercase().replace('-', "_");
    match upper.as_str() {
        "CONTENT_LENGTH" | "CONTENT_TYPE" => upper,
        _ => format!("HTTP_{}", upper),
    }
}

/// Reads the queue start from the `X-Queue-Start` or `X-Request-Start` header.
pub fn queue_start(head: &RequestHead<'_>) -> Option<u64> {
    ["x-queue-start", "x-request-start"]
        .iter()
        .find_map(|name| head.header(name).and_then(parse_queue_start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<()> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("accept", "text/html")
            .header("content-length", "0")
            .header("x-custom", "nope")
            .header("host", "example.com:8080")
            .body(())
            .unwrap()
    }

    #[test]
    fn test_query_params() {
        let req = request("/some/path?page=2&query=lorem");
        let params = DefaultRequest.params(&RequestHead::from_request(&req));
        assert_eq!(params["page"], "2");
        assert_eq!(params["query"], "lorem");
    }

    #[test]
    fn test_environment() {
        let req = request("/some/path?page=2");
        let headers = lantern_core::DEFAULT_REQUEST_HEADERS
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();
        let env = request_environment(&RequestHead::from_request(&req), &headers);
        assert_eq!(env["REQUEST_METHOD"], "GET");
        assert_eq!(env["PATH_INFO"], "/some/path");
        assert_eq!(env["QUERY_STRING"], "page=2");
        assert_eq!(env["SERVER_NAME"], "example.com");
        assert_eq!(env["HTTP_ACCEPT"], "text/html");
        assert_eq!(env["CONTENT_LENGTH"], "0");
        assert!(!env.contains_key("HTTP_X_CUSTOM"));
    }

    #[test]
    fn test_queue_start_headers() {
        let req = Request::builder()
            .header("x-request-start", "t=1000000")
            .body(())
            .unwrap();
        assert_eq!(queue_start(&RequestHead::from_request(&req)), Some(1_000_000));

        let req = Request::builder()
            .header("x-queue-start", "t=bogus")
            .header("x-request-start", "t=42")
            .body(())
            .unwrap();
        assert_eq!(queue_start(&RequestHead::from_request(&req)), Some(42));
    }
}
