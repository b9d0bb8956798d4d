//! The [`Handler`] trait and its blanket implementations.
//!
//! Handlers are plain async functions whose arguments implement
//! [`FromContext`], the way axum handlers take extractors:
//!
//! ```rust,ignore
//! // No arguments, nothing to send
//! async fn ping() {}
//!
//! // Returning a String replies with it
//! async fn echo(msg: Message) -> String {
//!     msg.text.unwrap_or_default()
//! }
//!
//! // Errors become HandlerExecutionErrors in the dispatch outcome
//! async fn ban(args: CommandArgs, ctx: Arc<HandlerContext>) -> Result<(), BoxError> {
//!     let user_id: i64 = args.args.parse()?;
//!     ctx.api().call("banChatMember", json!({ "user_id": user_id })).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tgbee_core::TypeSet;

use super::response::HandlerResponse;
use crate::context::HandlerContext;
use crate::error::BoxError;
use crate::extractor::FromContext;

/// An async callback invoked with a [`HandlerContext`].
///
/// Implemented for async functions taking 0-8 [`FromContext`] arguments and
/// returning a [`HandlerResponse`].
#[async_trait]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Update variants every argument can be extracted from.
    fn accepted_types() -> TypeSet;

    /// Extracts the arguments, runs the function and processes its result.
    async fn call(self, ctx: Arc<HandlerContext>) -> Result<(), BoxError>;
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: HandlerResponse,
            $( $ty: FromContext + Send + 'static, )*
        {
            fn accepted_types() -> TypeSet {
                let mut types = TypeSet::all();
                $( types = types & $ty::accepted_types(); )*
                types
            }

            async fn call(self, ctx: Arc<HandlerContext>) -> Result<(), BoxError> {
                $(
                    let $ty = $ty::from_context(&ctx)?;
                )*

                let res = (self)($($ty,)*).await;
                res.into_result(&ctx).await
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
