use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use lantern_core::utils::parse_type_from_debug;
use lantern_core::{CurrentTransaction, Namespace, Registry};
use tower_layer::Layer;
use tower_service::Service;

use crate::Completion;

type ActionFn<Job> = Arc<dyn Fn(&Job) -> String + Send + Sync>;

/// Tower layer that records a transaction for every job.
///
/// Each job runs in a fresh [`Registry`] sharing the agent of the current
/// one, so jobs processed concurrently never see each other's transaction.
/// The transaction is named through the action function, which the job
/// handler can override with [`set_action`](lantern_core::set_action).  It is
/// completed once the inner future resolves or is dropped, and an error
/// returned by the inner service is recorded on it.
///
/// # Examples
///
/// ```
/// use lantern_tower::JobLayer;
///
/// struct Job {
///     worker: &'static str,
/// }
///
/// let layer = JobLayer::new(|job: &Job| format!("{}#perform", job.worker));
/// # drop(layer);
/// ```
pub struct JobLayer<Job> {
    namespace: Namespace,
    action: ActionFn<Job>,
}

impl<Job> JobLayer<Job> {
    /// Creates a layer naming each transaction with `action`.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&Job) -> String + Send + Sync + 'static,
    {
        JobLayer {
            namespace: Namespace::BackgroundJob,
            action: Arc::new(action),
        }
    }

    /// Records transactions in another namespace than `background_job`.
    #[must_use]
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }
}

impl<Job> Clone for JobLayer<Job> {
    fn clone(&self) -> Self {
        JobLayer {
            namespace: self.namespace.clone(),
            action: self.action.clone(),
        }
    }
}

impl<Job> fmt::Debug for JobLayer<Job> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLayer")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<S, Job> Layer<S> for JobLayer<Job> {
    type Service = JobService<S, Job>;

    fn layer(&self, service: S) -> Self::Service {
        JobService {
            service,
            layer: self.clone(),
        }
    }
}

/// Tower service created by [`JobLayer`].
pub struct JobService<S, Job> {
    service: S,
    layer: JobLayer<Job>,
}

impl<S: Clone, Job> Clone for JobService<S, Job> {
    fn clone(&self) -> Self {
        JobService {
            service: self.service.clone(),
            layer: self.layer.clone(),
        }
    }
}

/// The future returned from [`JobService`].
#[pin_project::pin_project]
pub struct JobFuture<F> {
    registry: Arc<Registry>,
    completion: Option<Completion>,
    #[pin]
    future: F,
}

impl<F, T, E> Future for JobFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Debug + fmt::Display,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let future = this.future;
        let result = ready!(Registry::run(this.registry.clone(), || future.poll(cx)));
        if let Some(completion) = this.completion.take() {
            if let (Err(error), Some(transaction)) = (&result, completion.transaction()) {
                transaction.set_error(
                    &parse_type_from_debug(error),
                    &error.to_string(),
                    vec![],
                );
            }
        }
        Poll::Ready(result)
    }
}

impl<S, Job> Service<Job> for JobService<S, Job>
where
    S: Service<Job>,
    S::Error: fmt::Debug + fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = JobFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, job: Job) -> Self::Future {
        let registry = Arc::new(Registry::new_from_top(Registry::current()));
        let completion = match registry.start_transaction(self.layer.namespace.clone()) {
            CurrentTransaction::Active(transaction) => {
                transaction.set_inferred_action(&(self.layer.action)(&job));
                Some(Completion::new(transaction))
            }
            CurrentTransaction::Inactive => None,
        };
        let future = Registry::run(registry.clone(), || self.service.call(job));
        JobFuture {
            registry,
            completion,
            future,
        }
    }
}
