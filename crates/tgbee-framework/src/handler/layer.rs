//! Tower layers for handler services.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::layer::util::Stack;
use tower::{Layer, Service, ServiceBuilder};

use crate::context::HandlerContext;
use crate::error::BoxError;

/// Stops propagation when the inner service succeeds.
///
/// Failures pass through unchanged and leave propagation alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopPropagationLayer;

impl<S> Layer<S> for StopPropagationLayer {
    type Service = StopPropagation<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StopPropagation { inner }
    }
}

#[derive(Debug, Clone)]
pub struct StopPropagation<S> {
    inner: S,
}

impl<S> Service<Arc<HandlerContext>> for StopPropagation<S>
where
    S: Service<Arc<HandlerContext>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, ctx: Arc<HandlerContext>) -> Self::Future {
        let mut inner = self.inner.clone();
        Box::pin(async move {
            inner.call(Arc::clone(&ctx)).await?;
            ctx.stop_propagation();
            Ok(())
        })
    }
}

/// Handler-specific builder methods for [`ServiceBuilder`].
pub trait ServiceBuilderExt<L> {
    /// Stops propagation after the handler succeeds.
    fn stop_propagation(self) -> ServiceBuilder<Stack<StopPropagationLayer, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn stop_propagation(self) -> ServiceBuilder<Stack<StopPropagationLayer, L>> {
        self.layer(StopPropagationLayer)
    }
}
