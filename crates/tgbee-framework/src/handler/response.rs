use async_trait::async_trait;

use crate::context::HandlerContext;
use crate::error::BoxError;

/// A value a handler can return.
///
/// Processing may perform side effects (sending a reply); the returned
/// `Result` decides whether the invocation counts as failed.
#[async_trait]
pub trait HandlerResponse: Send + 'static {
    async fn into_result(self, ctx: &HandlerContext) -> Result<(), BoxError>;
}

/// Nothing to do.
#[async_trait]
impl HandlerResponse for () {
    async fn into_result(self, _ctx: &HandlerContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Replies with the string.
#[async_trait]
impl HandlerResponse for String {
    async fn into_result(self, ctx: &HandlerContext) -> Result<(), BoxError> {
        ctx.reply(&self).await.map(|_| ())
    }
}

#[async_trait]
impl HandlerResponse for &'static str {
    async fn into_result(self, ctx: &HandlerContext) -> Result<(), BoxError> {
        ctx.reply(self).await.map(|_| ())
    }
}

/// On `Some`, processes the inner value. On `None`, does nothing.
#[async_trait]
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    async fn into_result(self, ctx: &HandlerContext) -> Result<(), BoxError> {
        match self {
            Some(t) => t.into_result(ctx).await,
            None => Ok(()),
        }
    }
}

/// On `Ok`, processes the inner value. On `Err`, fails the invocation.
#[async_trait]
impl<T, E> HandlerResponse for Result<T, E>
where
    T: HandlerResponse,
    E: Into<BoxError> + Send + 'static,
{
    async fn into_result(self, ctx: &HandlerContext) -> Result<(), BoxError> {
        match self {
            Ok(t) => t.into_result(ctx).await,
            Err(e) => Err(e.into()),
        }
    }
}
