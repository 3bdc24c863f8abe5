use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::Registry;

/// A future that binds a [`Registry`] to its execution.
///
/// This makes sure that the registry, and with it the current transaction, is
/// the same whichever thread the future is polled on.
#[derive(Debug)]
#[pin_project::pin_project]
pub struct RegistryFuture<F> {
    registry: Arc<Registry>,
    #[pin]
    future: F,
}

impl<F> RegistryFuture<F> {
    /// Creates a new bound future with a [`Registry`].
    pub fn new(registry: Arc<Registry>, future: F) -> Self {
        Self { registry, future }
    }

    /// The registry bound to this future.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl<F> Future for RegistryFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let registry = this.registry.clone();
        let future = this.future;
        Registry::run(registry, || future.poll(cx))
    }
}

/// Future extensions for lantern.
pub trait RegistryFutureExt: Sized {
    /// Binds a registry to the execution of this future.
    ///
    /// This ensures that the future is polled within the given registry.
    fn bind_registry<R>(self, registry: R) -> RegistryFuture<Self>
    where
        R: Into<Arc<Registry>>,
    {
        RegistryFuture::new(registry.into(), self)
    }
}

impl<F> RegistryFutureExt for F where F: Future {}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::test::with_captured_transactions;
    use crate::Namespace;

    fn block_on<F: Future>(future: F) -> F::Output {
        struct NoopWaker;
        impl std::task::Wake for NoopWaker {
            fn wake(self: Arc<Self>) {}
        }
        let waker = Arc::new(NoopWaker).into();
        let mut cx = Context::from_waker(&waker);
        let mut future = std::pin::pin!(future);
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return output;
            }
        }
    }

    #[test]
    fn test_transaction_follows_future_across_threads() {
        let transactions = with_captured_transactions(|| {
            let registry = Arc::new(Registry::new_from_top(Registry::current()));
            let future = async {
                let transaction = crate::start_transaction(Namespace::BackgroundJob);
                transaction.set_metadata("step", "started");
                crate::current_transaction().complete();
            }
            .bind_registry(registry.clone());
            thread::spawn(move || block_on(future)).join().unwrap();
            assert!(!registry.current_transaction().is_active());
        });
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].metadata["step"], "started");
    }
}
