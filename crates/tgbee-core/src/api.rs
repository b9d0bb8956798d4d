//! Outbound API collaborator.
//!
//! The dispatch layer never talks to the network itself. Handlers reach the
//! remote service through an [`Api`] handle carried by their context; the
//! transport crate provides the HTTP implementation, tests provide mocks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::types::{Message, User};

/// A request/response channel to the remote Bot API.
///
/// Implementations only move JSON; method-specific parameter shapes are built
/// by [`ApiExt`].
#[async_trait]
pub trait Api: Send + Sync {
    /// Calls `method` with a JSON object of parameters and returns the
    /// `result` field of a successful response.
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value>;
}

/// A shared, type-erased API handle.
pub type BoxedApi = Arc<dyn Api>;

fn decode<T: DeserializeOwned>(value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(ApiError::decode)
}

/// Typed helpers over [`Api::call`] for the methods handlers use most.
#[async_trait]
pub trait ApiExt: Api {
    async fn get_me(&self) -> ApiResult<User> {
        decode(self.call("getMe", json!({})).await?)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Message> {
        let params = json!({ "chat_id": chat_id, "text": text });
        decode(self.call("sendMessage", params).await?)
    }

    /// Sends `text` to the chat of `message`, quoting it.
    async fn reply_to(&self, message: &Message, text: &str) -> ApiResult<Message> {
        let params = json!({
            "chat_id": message.chat.id,
            "text": text,
            "reply_parameters": { "message_id": message.message_id },
        });
        decode(self.call("sendMessage", params).await?)
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> ApiResult<bool> {
        let mut params = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            params["text"] = Value::from(text);
        }
        decode(self.call("answerCallbackQuery", params).await?)
    }

    async fn answer_inline_query(&self, inline_query_id: &str, results: Value) -> ApiResult<bool> {
        let params = json!({ "inline_query_id": inline_query_id, "results": results });
        decode(self.call("answerInlineQuery", params).await?)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> ApiResult<bool> {
        let params = json!({ "chat_id": chat_id, "message_id": message_id });
        decode(self.call("deleteMessage", params).await?)
    }

    /// Registers `url` as the push endpoint. Polling stops working until
    /// [`delete_webhook`](Self::delete_webhook) is called.
    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> ApiResult<bool> {
        let mut params = json!({ "url": url });
        if let Some(token) = secret_token {
            params["secret_token"] = Value::from(token);
        }
        decode(self.call("setWebhook", params).await?)
    }

    async fn delete_webhook(&self, drop_pending_updates: bool) -> ApiResult<bool> {
        let params = json!({ "drop_pending_updates": drop_pending_updates });
        decode(self.call("deleteWebhook", params).await?)
    }
}

impl<A: Api + ?Sized> ApiExt for A {}

#[async_trait]
impl<A: Api + ?Sized> Api for Arc<A> {
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        (**self).call(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Api for Recorder {
        async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
            self.calls.lock().unwrap().push((method.to_string(), params));
            Ok(Value::Bool(true))
        }
    }

    #[tokio::test]
    async fn test_helpers_build_params() {
        let api: BoxedApi = Arc::new(Recorder::default());
        assert!(api.answer_callback_query("q1", Some("done")).await.unwrap());
        assert!(api.delete_webhook(true).await.unwrap());

        let recorder = Recorder::default();
        recorder.set_webhook("https://x/hook", None).await.unwrap();
        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].0, "setWebhook");
        assert_eq!(calls[0].1, json!({"url": "https://x/hook"}));
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported() {
        let api = Recorder::default();
        // `true` is not a message object
        let err = api.send_message(1, "hi").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
