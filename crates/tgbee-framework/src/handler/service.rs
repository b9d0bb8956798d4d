//! Tower integration for handlers.
//!
//! [`HandlerService<H, T>`] wraps a single handler function and implements
//! `tower::Service<Arc<HandlerContext>>`. The registry stores every entry as a
//! [`BoxedHandler`], so any tower service with the same request, response and
//! error types can be registered, and ordinary tower layers can be stacked on
//! top of a handler before registering it.

use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;
use tower::util::BoxCloneSyncService;

use super::traits::Handler;
use crate::context::HandlerContext;
use crate::error::BoxError;

/// A type-erased, `Clone + Send + Sync` handler service.
pub type BoxedHandler = BoxCloneSyncService<Arc<HandlerContext>, (), BoxError>;

/// A tower [`Service`] that calls a single handler.
pub struct HandlerService<H, T> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<H: Clone, T> Clone for HandlerService<H, T> {
    fn clone(&self) -> Self {
        HandlerService {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H, T> HandlerService<H, T>
where
    H: Handler<T>,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }

    /// Update variants the wrapped handler's extractors accept.
    pub fn accepted_types(&self) -> tgbee_core::TypeSet {
        H::accepted_types()
    }
}

impl<H, T> From<H> for HandlerService<H, T>
where
    H: Handler<T>,
{
    fn from(handler: H) -> Self {
        HandlerService::new(handler)
    }
}

impl<H, T> Service<Arc<HandlerContext>> for HandlerService<H, T>
where
    H: Handler<T>,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<HandlerContext>) -> Self::Future {
        Handler::call(self.handler.clone(), ctx)
    }
}

/// Boxes any compatible tower service into a [`BoxedHandler`].
pub fn boxed<S>(service: S) -> BoxedHandler
where
    S: Service<Arc<HandlerContext>, Response = (), Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}
