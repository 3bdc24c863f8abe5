use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use http::{Request, Response};
use lantern_core::utils::parse_type_from_debug;
use lantern_core::{
    BodyFormat, CurrentTransaction, EventGuard, Map, Namespace, Registry, Transaction,
};
use tower_layer::Layer;
use tower_service::Service;

use crate::api::ApiEndpoint;
use crate::body::BodyWrapper;
use crate::request::{
    queue_start, request_environment, DefaultRequest, RequestAccessor, RequestHead,
};
use crate::Completion;

/// A predicate deciding from the request whether errors are recorded.
pub type ReportPredicate = Arc<dyn Fn(&RequestHead<'_>) -> bool + Send + Sync>;

/// Reads the request parameters through a [`RequestAccessor`].
pub type ParamsMethod<A> = fn(&A, &RequestHead<'_>) -> Map;

/// Whether errors returned by the inner service are recorded.
#[derive(Clone, Default)]
pub enum ReportErrors {
    /// Record errors only when this layer started the transaction.
    ///
    /// Nested layers leave recording to the outermost one.
    #[default]
    Default,
    /// Always or never record errors.
    Enabled(bool),
    /// Ask a predicate, evaluated on the request before it is handed on.
    Predicate(ReportPredicate),
}

impl ReportErrors {
    /// Creates a predicate policy.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&RequestHead<'_>) -> bool + Send + Sync + 'static,
    {
        ReportErrors::Predicate(Arc::new(f))
    }

    fn decide(&self, head: &RequestHead<'_>, owner: bool) -> bool {
        match self {
            ReportErrors::Default => owner,
            ReportErrors::Enabled(enabled) => *enabled,
            ReportErrors::Predicate(predicate) => predicate(head),
        }
    }
}

impl From<bool> for ReportErrors {
    fn from(enabled: bool) -> Self {
        ReportErrors::Enabled(enabled)
    }
}

impl fmt::Debug for ReportErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportErrors::Default => f.write_str("Default"),
            ReportErrors::Enabled(enabled) => f.debug_tuple("Enabled").field(enabled).finish(),
            ReportErrors::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

/// Lets a handler opt out of error recording for its request.
///
/// The layer inserts this into the request extensions.  Calling
/// [`ErrorReportingFlag::disable`] before returning an error keeps the error
/// off the transaction.
#[derive(Clone, Debug)]
pub struct ErrorReportingFlag(Arc<AtomicBool>);

impl ErrorReportingFlag {
    /// Creates an enabled flag.
    pub fn new() -> Self {
        ErrorReportingFlag(Arc::new(AtomicBool::new(true)))
    }

    /// Suppresses error recording for this request.
    pub fn disable(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    /// Returns `true` unless recording was disabled.
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ErrorReportingFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks a response whose body already records the body event.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseInstrumented;

/// An action name for the transaction, set as a response extension.
///
/// It never replaces an action set explicitly through
/// [`Transaction::set_action`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionName(pub String);

struct HttpOptions<A> {
    instrument_event_name: Option<String>,
    report_errors: ReportErrors,
    accessor: A,
    params_method: ParamsMethod<A>,
    endpoint: Option<ApiEndpoint>,
}

impl<A: Clone> Clone for HttpOptions<A> {
    fn clone(&self) -> Self {
        HttpOptions {
            instrument_event_name: self.instrument_event_name.clone(),
            report_errors: self.report_errors.clone(),
            accessor: self.accessor.clone(),
            params_method: self.params_method,
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Tower layer that records a transaction for every HTTP request.
///
/// Requests arriving while a transaction is already running, either in the
/// request extensions or in the current registry, are recorded on that
/// transaction and left for its owner to complete.  Otherwise a fresh
/// [`Registry`] is bound to the request and a new transaction is started and
/// completed once the response body is done.
///
/// # Examples
///
/// ```
/// use lantern_tower::{HttpLayer, ReportErrors};
///
/// let layer = HttpLayer::new()
///     .instrument_event_name("process_action.http")
///     .report_errors(ReportErrors::predicate(|head| head.uri.path() != "/health"));
/// # drop(layer);
/// ```
#[derive(Clone)]
pub struct HttpLayer<A: RequestAccessor = DefaultRequest> {
    options: Arc<HttpOptions<A>>,
}

impl HttpLayer {
    /// Creates a new layer reading requests with [`DefaultRequest`].
    pub fn new() -> Self {
        Self::with_accessor(DefaultRequest)
    }
}

impl Default for HttpLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RequestAccessor> HttpLayer<A> {
    /// Creates a new layer reading requests with a custom accessor.
    pub fn with_accessor(accessor: A) -> Self {
        HttpLayer {
            options: Arc::new(HttpOptions {
                instrument_event_name: None,
                report_errors: ReportErrors::Default,
                accessor,
                params_method: A::params,
                endpoint: None,
            }),
        }
    }

    fn update<F: FnOnce(&mut HttpOptions<A>)>(mut self, f: F) -> Self {
        f(Arc::make_mut(&mut self.options));
        self
    }

    /// Records an event of this name around the inner service.
    #[must_use]
    pub fn instrument_event_name(self, name: &str) -> Self {
        let name = name.to_owned();
        self.update(|options| options.instrument_event_name = Some(name))
    }

    /// Sets the error recording policy.
    #[must_use]
    pub fn report_errors<R: Into<ReportErrors>>(self, report_errors: R) -> Self {
        let report_errors = report_errors.into();
        self.update(|options| options.report_errors = report_errors)
    }

    /// Overrides how request parameters are read.
    #[must_use]
    pub fn params_method(self, params_method: ParamsMethod<A>) -> Self {
        self.update(|options| options.params_method = params_method)
    }

    pub(crate) fn endpoint(self, endpoint: ApiEndpoint) -> Self {
        self.update(|options| options.endpoint = Some(endpoint))
    }
}

impl<S, A: RequestAccessor> Layer<S> for HttpLayer<A> {
    type Service = HttpService<S, A>;

    fn layer(&self, service: S) -> Self::Service {
        HttpService {
            service,
            options: self.options.clone(),
        }
    }
}

/// Tower service created by [`HttpLayer`].
#[derive(Clone)]
pub struct HttpService<S, A: RequestAccessor = DefaultRequest> {
    service: S,
    options: Arc<HttpOptions<A>>,
}

struct RequestState<A> {
    event: Option<EventGuard>,
    completion: Option<Completion>,
    transaction: Transaction,
    report_errors: bool,
    flag: ErrorReportingFlag,
    method: String,
    options: Arc<HttpOptions<A>>,
}

/// The future returned from [`HttpService`].
#[pin_project::pin_project]
pub struct HttpFuture<F, A> {
    registry: Option<Arc<Registry>>,
    state: Option<RequestState<A>>,
    #[pin]
    future: F,
}

impl<F, A, ResBody, Error> Future for HttpFuture<F, A>
where
    F: Future<Output = Result<Response<ResBody>, Error>>,
    Error: fmt::Debug + fmt::Display,
{
    type Output = Result<Response<BodyWrapper<ResBody>>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let future = this.future;
        let result = ready!(match this.registry {
            Some(registry) => Registry::run(registry.clone(), || future.poll(cx)),
            None => future.poll(cx),
        });
        let Some(mut state) = this.state.take() else {
            return Poll::Ready(result.map(|response| response.map(BodyWrapper::passthrough)));
        };
        state.event.take();

        if let Some(endpoint) = &state.options.endpoint {
            let route = endpoint.route_path();
            state
                .transaction
                .set_inferred_action(&endpoint.action(&state.method));
            state.transaction.set_metadata("path", &route);
            state.transaction.set_metadata("method", &state.method);
        }

        Poll::Ready(match result {
            Ok(mut response) => {
                if let Some(ActionName(action)) = response.extensions().get() {
                    state.transaction.set_inferred_action(action);
                }
                let instrumented = response.extensions().get::<ResponseInstrumented>().is_some();
                if !instrumented {
                    response.extensions_mut().insert(ResponseInstrumented);
                }
                let completion = state.completion.take();
                Ok(response.map(|body| {
                    let body = if instrumented {
                        BodyWrapper::passthrough(body)
                    } else {
                        BodyWrapper::new(body, state.transaction.clone())
                    };
                    body.completing(completion)
                }))
            }
            Err(error) => {
                if state.report_errors && state.flag.is_enabled() {
                    state.transaction.set_error(
                        &parse_type_from_debug(&error),
                        &error.to_string(),
                        vec![],
                    );
                }
                Err(error)
            }
        })
    }
}

impl<S, A, ReqBody, ResBody> Service<Request<ReqBody>> for HttpService<S, A>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Debug + fmt::Display,
    A: RequestAccessor,
{
    type Response = Response<BodyWrapper<ResBody>>;
    type Error = S::Error;
    type Future = HttpFuture<S::Future, A>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let inherited = request
            .extensions()
            .get::<Transaction>()
            .filter(|transaction| !transaction.is_completed())
            .cloned()
            .or_else(|| lantern_core::current_transaction().into_transaction());

        let (transaction, registry) = match inherited {
            Some(transaction) => (Some(transaction), None),
            None => {
                let registry = Arc::new(Registry::new_from_top(Registry::current()));
                match registry.start_transaction(Namespace::HttpRequest) {
                    CurrentTransaction::Active(transaction) => (Some(transaction), Some(registry)),
                    CurrentTransaction::Inactive => (None, None),
                }
            }
        };
        let Some(transaction) = transaction else {
            return HttpFuture {
                registry: None,
                state: None,
                future: self.service.call(request),
            };
        };
        let owner = registry.is_some();

        request.extensions_mut().insert(transaction.clone());
        let flag = match request.extensions().get::<ErrorReportingFlag>() {
            Some(flag) => flag.clone(),
            None => {
                let flag = ErrorReportingFlag::new();
                request.extensions_mut().insert(flag.clone());
                flag
            }
        };

        let options = &self.options;
        let head = RequestHead::from_request(&request);
        let report_errors = options.report_errors.decide(&head, owner);
        let method = options.accessor.method(&head);
        let path = options.accessor.path(&head);
        transaction.set_metadata("method", &method);
        transaction.set_metadata("request_method", &method);
        transaction.set_metadata("path", &path);
        transaction.set_metadata("request_path", &path);
        transaction.set_params((options.params_method)(&options.accessor, &head));
        transaction.set_session_data(options.accessor.session(&head));
        let request_headers = registry
            .as_ref()
            .map_or_else(Registry::current, Arc::clone)
            .agent()
            .map(|agent| agent.options().request_headers.clone())
            .unwrap_or_default();
        transaction.set_environment(request_environment(&head, &request_headers));
        if let Some(queue_start) = queue_start(&head) {
            transaction.set_queue_start(queue_start);
        }

        let event = options
            .instrument_event_name
            .as_ref()
            .map(|name| transaction.start_event(name, "", "", BodyFormat::Plain));

        let future = match &registry {
            Some(registry) => Registry::run(registry.clone(), || self.service.call(request)),
            None => self.service.call(request),
        };

        HttpFuture {
            state: Some(RequestState {
                completion: owner.then(|| Completion::new(transaction.clone())),
                transaction,
                event,
                report_errors,
                flag,
                method,
                options: self.options.clone(),
            }),
            registry,
            future,
        }
    }
}
