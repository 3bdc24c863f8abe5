use ureq::{Error, Middleware, MiddlewareNext, Request, Response};
use url::Url;

use crate::instrumentor::{CallData, OutboundInstrumentor};

/// A [`ureq`] middleware recording a `request.ureq` event for every call.
///
/// This is enabled by the `ureq` feature flag.
///
/// ```no_run
/// let agent = ureq::AgentBuilder::new()
///     .middleware(lantern_outbound::UreqInstrumentation::new())
///     .build();
/// let _response = agent.get("https://example.com").call();
/// ```
#[derive(Clone, Debug)]
pub struct UreqInstrumentation {
    instrumentor: OutboundInstrumentor,
}

impl UreqInstrumentation {
    /// Creates the middleware, using the installed `ureq` instrumentor if any.
    pub fn new() -> UreqInstrumentation {
        UreqInstrumentation {
            instrumentor: crate::instrumentor_for("ureq")
                .unwrap_or_else(|| OutboundInstrumentor::new("ureq")),
        }
    }
}

impl Default for UreqInstrumentation {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for UreqInstrumentation {
    fn handle(&self, request: Request, next: MiddlewareNext<'_>) -> Result<Response, Error> {
        match call_data(&request) {
            Some(data) => self
                .instrumentor
                .instrument("ureq.request", &data, || next.handle(request)),
            None => next.handle(request),
        }
    }
}

fn call_data(request: &Request) -> Option<CallData> {
    let url = Url::parse(request.url()).ok()?;
    let host = url.host_str()?;
    Some(
        CallData::new(host)
            .method(request.method())
            .scheme(url.scheme()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_data_from_request() {
        let request = ureq::post("https://api.example.com/v1/users?page=2");
        let data = call_data(&request).unwrap();
        assert_eq!(data.host, "api.example.com");
        assert_eq!(data.method.as_deref(), Some("POST"));
        assert_eq!(data.scheme.as_deref(), Some("https"));
    }

    #[test]
    fn test_call_data_without_host() {
        assert!(call_data(&ureq::get("not a url")).is_none());
    }

    fn answer_locally(_request: Request, _next: MiddlewareNext<'_>) -> Result<Response, Error> {
        Response::new(204, "No Content", "")
    }

    #[test]
    fn test_records_request_event() {
        use lantern_core::test::with_captured_transactions;
        use lantern_core::Namespace;

        let transactions = with_captured_transactions(|| {
            let agent = ureq::AgentBuilder::new()
                .middleware(UreqInstrumentation::new())
                .middleware(answer_locally)
                .build();
            let transaction = lantern_core::start_transaction(Namespace::BackgroundJob);
            let response = agent.get("http://example.com/status").call().unwrap();
            assert_eq!(response.status(), 204);
            transaction.complete();
        });

        assert_eq!(transactions.len(), 1);
        let events: Vec<_> = transactions[0].events_named("request.ureq").collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "GET http://example.com");
        assert!(!events[0].is_open());
    }
}
