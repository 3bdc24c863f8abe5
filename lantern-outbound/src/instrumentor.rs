use std::borrow::Cow;

/// Describes an outbound call as seen by the HTTP client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallData {
    /// The remote host.
    pub host: String,
    /// The request method, for example `get`.
    pub method: Option<String>,
    /// The URL scheme, `http` when missing.
    pub scheme: Option<String>,
}

impl CallData {
    /// Creates call data for the given host.
    pub fn new<H: Into<String>>(host: H) -> CallData {
        CallData {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Sets the request method.
    #[must_use]
    pub fn method<M: Into<String>>(mut self, method: M) -> CallData {
        self.method = Some(method.into());
        self
    }

    /// Sets the URL scheme.
    #[must_use]
    pub fn scheme<S: Into<String>>(mut self, scheme: S) -> CallData {
        self.scheme = Some(scheme.into());
        self
    }

    fn request_title(&self) -> String {
        let scheme = self.scheme.as_deref().unwrap_or("http");
        match self.method.as_deref() {
            Some(method) => format!("{} {}://{}", method.to_uppercase(), scheme, self.host),
            None => format!("{}://{}", scheme, self.host),
        }
    }
}

enum Phase {
    Request,
    Response,
}

/// Records outbound calls of one HTTP client as events on the current
/// transaction.
///
/// The client calls [`OutboundInstrumentor::instrument`] with
/// `<client>.request` around sending a request and `<client>.response`
/// around reading the response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundInstrumentor {
    client: Cow<'static, str>,
}

impl OutboundInstrumentor {
    /// Creates an instrumentor for the named client.
    pub fn new<C: Into<Cow<'static, str>>>(client: C) -> OutboundInstrumentor {
        OutboundInstrumentor {
            client: client.into(),
        }
    }

    /// The client name used in event names.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Runs `f` and returns its result unchanged.
    ///
    /// `<client>.request` is recorded as a `request.<client>` event titled
    /// `"<METHOD> <scheme>://<host>"`, `<client>.response` as a
    /// `response.<client>` event titled with the host.  Other names only run
    /// `f`.
    pub fn instrument<F: FnOnce() -> R, R>(&self, name: &str, data: &CallData, f: F) -> R {
        match self.phase(name) {
            Some(Phase::Request) => lantern_core::instrument(
                &format!("request.{}", self.client),
                &data.request_title(),
                "",
                f,
            ),
            Some(Phase::Response) => {
                lantern_core::instrument(&format!("response.{}", self.client), &data.host, "", f)
            }
            None => f(),
        }
    }

    fn phase(&self, name: &str) -> Option<Phase> {
        let (client, phase) = name.rsplit_once('.')?;
        if client != self.client {
            return None;
        }
        match phase {
            "request" => Some(Phase::Request),
            "response" => Some(Phase::Response),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_title() {
        let data = CallData::new("www.example.com").method("post").scheme("https");
        assert_eq!(data.request_title(), "POST https://www.example.com");
        assert_eq!(CallData::new("db").request_title(), "http://db");
    }

    #[test]
    fn test_phase_requires_own_client() {
        let instrumentor = OutboundInstrumentor::new("ureq");
        assert!(matches!(instrumentor.phase("ureq.request"), Some(Phase::Request)));
        assert!(matches!(instrumentor.phase("ureq.response"), Some(Phase::Response)));
        assert!(instrumentor.phase("excon.request").is_none());
        assert!(instrumentor.phase("ureq.retry").is_none());
        assert!(instrumentor.phase("request").is_none());
    }
}
