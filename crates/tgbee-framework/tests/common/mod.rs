#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tgbee_core::{Api, ApiResult, BoxedApi, Update};

/// Records every outbound call and answers with an empty message.
#[derive(Default)]
pub struct RecordingApi {
    pub calls: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl Api for RecordingApi {
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.calls.lock().push((method.to_string(), params.clone()));
        Ok(json!({
            "message_id": 1000,
            "date": 0,
            "chat": {"id": params.get("chat_id").cloned().unwrap_or(json!(0)), "type": "private"},
        }))
    }
}

pub fn api() -> (Arc<RecordingApi>, BoxedApi) {
    let api = Arc::new(RecordingApi::default());
    (Arc::clone(&api), api)
}

pub fn message(update_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 0,
            "chat": {"id": 10, "type": "private"},
            "from": {"id": 20, "first_name": "Ann", "username": "ann"},
            "text": text
        }
    }))
    .unwrap()
}

pub fn callback(update_id: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "callback_query": {
            "id": "cb",
            "from": {"id": 20, "first_name": "Ann"},
            "chat_instance": "ci",
            "data": data
        }
    }))
    .unwrap()
}

/// A shared log of handler invocations.
#[derive(Clone, Default)]
pub struct Log(pub Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}
