use std::sync::LazyLock;

use regex::Regex;
use tower_layer::Layer;

use crate::http::{HttpLayer, HttpService, ReportErrors};
use crate::request::DefaultRequest;

/// Name of the event recorded around a routed API endpoint.
pub const API_REQUEST_EVENT: &str = "process_request.api";

static FORMAT_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\.[^)]*\)$").unwrap());

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \{\*?(?P<brace>[A-Za-z_][A-Za-z0-9_]*)\}
        | <(?P<angle>[A-Za-z_][A-Za-z0-9_]*)>
        | ^\*(?P<splat>[A-Za-z_][A-Za-z0-9_]*)$
    ",
    )
    .unwrap()
});

static DUPLICATE_SLASHES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/{2,}").unwrap());

/// A routed API endpoint.
///
/// The route path is made of the namespaces the endpoint is mounted under and
/// its own path.  Router placeholders in any of the common styles are
/// normalised to `:name`.
///
/// # Examples
///
/// ```
/// use lantern_tower::ApiEndpoint;
///
/// let endpoint = ApiEndpoint::new("MyApp::Api").namespace("users").namespace("{id}").path("/");
/// assert_eq!(endpoint.route_path(), "/users/:id/");
/// assert_eq!(endpoint.action("GET"), "GET::MyApp::Api#/users/:id/");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiEndpoint {
    api: String,
    namespaces: Vec<String>,
    path: String,
}

impl ApiEndpoint {
    /// Creates an endpoint of the named API at the root path.
    pub fn new(api: &str) -> Self {
        ApiEndpoint {
            api: api.to_owned(),
            namespaces: Vec::new(),
            path: "/".to_owned(),
        }
    }

    /// Nests the endpoint in one more namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespaces.push(namespace.to_owned());
        self
    }

    /// Sets the path of the endpoint within its namespaces.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_owned();
        self
    }

    /// The name of the API.
    pub fn api(&self) -> &str {
        &self.api
    }

    /// The normalised route path, for example `/v1/beta/ping`.
    ///
    /// An endpoint path of `/` renders as empty, so an endpoint directly below
    /// a parameter keeps the trailing slash (`/users/:id/`).
    pub fn route_path(&self) -> String {
        let segments = self
            .namespaces
            .iter()
            .chain(std::iter::once(&self.path))
            .map(|segment| normalize_segment(segment))
            .collect::<Vec<_>>();
        let route = format!("/{}", segments.join("/"));
        DUPLICATE_SLASHES_RE.replace_all(&route, "/").into_owned()
    }

    /// The action name for a request with the given method.
    pub fn action(&self, method: &str) -> String {
        format!("{}::{}#{}", method, self.api, self.route_path())
    }
}

fn normalize_segment(segment: &str) -> String {
    let segment = FORMAT_SUFFIX_RE.replace(segment, "");
    segment
        .trim_matches('/')
        .split('/')
        .map(|part| {
            PLACEHOLDER_RE
                .replace(part, |caps: &regex::Captures<'_>| {
                    let name = caps
                        .name("brace")
                        .or_else(|| caps.name("angle"))
                        .or_else(|| caps.name("splat"))
                        .map_or("", |m| m.as_str());
                    format!(":{}", name)
                })
                .into_owned()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Tower layer for a routed API endpoint.
///
/// It behaves like [`HttpLayer`] and additionally names the transaction after
/// the endpoint, `<METHOD>::<Api>#<route path>`, and sets the `path` and
/// `method` metadata to the route path and the request method.  An event
/// named [`API_REQUEST_EVENT`] is recorded around the endpoint.
#[derive(Clone)]
pub struct ApiLayer {
    inner: HttpLayer<DefaultRequest>,
}

impl ApiLayer {
    /// Creates a layer for the given endpoint.
    pub fn new(endpoint: ApiEndpoint) -> Self {
        ApiLayer {
            inner: HttpLayer::new()
                .instrument_event_name(API_REQUEST_EVENT)
                .endpoint(endpoint),
        }
    }

    /// Sets the error recording policy.
    #[must_use]
    pub fn report_errors<R: Into<ReportErrors>>(self, report_errors: R) -> Self {
        ApiLayer {
            inner: self.inner.report_errors(report_errors),
        }
    }
}

impl<S> Layer<S> for ApiLayer {
    type Service = HttpService<S, DefaultRequest>;

    fn layer(&self, service: S) -> Self::Service {
        self.inner.layer(service)
    }
}
