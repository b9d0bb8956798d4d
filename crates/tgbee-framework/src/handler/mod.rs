//! Handler functions and their tower plumbing.
//!
//! - [`traits`]: the [`Handler`] trait, implemented for async functions whose
//!   arguments are [`FromContext`](crate::extractor::FromContext) extractors
//! - [`response`]: what a handler may return
//! - [`service`]: the [`HandlerService`] wrapper and the boxed form stored in
//!   the registry
//! - [`layer`]: tower layers that make sense around a handler
//!
//! ```text
//! ServiceBuilder::new()
//!     .stop_propagation()           ← StopPropagationLayer
//!     .service(HandlerService::new(ban))
//! ```

pub mod layer;
pub mod response;
pub mod service;
pub mod traits;

pub use layer::{ServiceBuilderExt, StopPropagation, StopPropagationLayer};
pub use response::HandlerResponse;
pub use service::{BoxedHandler, HandlerService, boxed};
pub use traits::Handler;

pub use tower::{Layer, ServiceBuilder};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tgbee_core::{Api, ApiResult, Message, TypeSet, UpdateType};
    use tower::{Service, ServiceExt};

    use super::*;
    use crate::context::HandlerContext;
    use crate::error::BoxError;
    use crate::extractor::CommandArgs;

    struct Sink;

    #[async_trait]
    impl Api for Sink {
        async fn call(&self, _method: &str, params: Value) -> ApiResult<Value> {
            Ok(json!({
                "message_id": 1, "date": 0,
                "chat": {"id": params["chat_id"], "type": "private"},
            }))
        }
    }

    fn ctx(text: &str) -> Arc<HandlerContext> {
        let update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 1, "date": 0,
                "chat": {"id": 1, "type": "private"},
                "text": text
            }
        }))
        .unwrap();
        HandlerContext::detached(update, Arc::new(Sink))
    }

    async fn nothing() {}

    async fn echo(msg: Message) -> String {
        msg.text.unwrap_or_default()
    }

    async fn parse(args: CommandArgs) -> Result<(), BoxError> {
        let _: i64 = args.args.parse()?;
        Ok(())
    }

    async fn on_callback(_q: tgbee_core::CallbackQuery) {}

    #[test]
    fn test_accepted_types_intersect() {
        assert_eq!(HandlerService::new(nothing).accepted_types(), TypeSet::all());
        assert_eq!(HandlerService::new(echo).accepted_types(), TypeSet::MESSAGES);
        assert_eq!(
            HandlerService::new(on_callback).accepted_types(),
            TypeSet::single(UpdateType::CallbackQuery)
        );
    }

    #[tokio::test]
    async fn test_handler_result_is_service_result() {
        let mut svc = HandlerService::new(parse);
        assert!(svc.ready().await.unwrap().call(ctx("/ban 12")).await.is_ok());
        assert!(svc.call(ctx("/ban twelve")).await.is_err());
        assert!(HandlerService::new(echo).call(ctx("hi")).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_propagation_only_on_success() {
        let mut ok = ServiceBuilder::new()
            .stop_propagation()
            .service(HandlerService::new(parse));
        let c = ctx("/ban 1");
        ok.call(Arc::clone(&c)).await.unwrap();
        assert!(!c.is_propagating());

        let c = ctx("/ban x");
        assert!(ok.call(Arc::clone(&c)).await.is_err());
        assert!(c.is_propagating());
    }
}
