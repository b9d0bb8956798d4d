//! Handler context.
//!
//! Two layers model how one update flows through its handlers:
//!
//! - [`UpdateContext`]: the **shared** part, one per dispatched update. It
//!   holds the update, the API handle, the propagation flag and a small typed
//!   state map visible to every handler of that update.
//! - [`HandlerContext`]: what a handler receives: the shared part plus the
//!   identity (name, group) of the entry being invoked.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tgbee_core::{ApiExt, BoxedApi, Message, Update, UpdateKind};

use crate::error::{BoxError, ExtractError};
use crate::registry::GroupId;

/// Shared per-update state.
pub struct UpdateContext {
    update: Arc<Update>,
    api: BoxedApi,
    /// Cleared by [`HandlerContext::stop_propagation`].
    is_propagating: AtomicBool,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl UpdateContext {
    pub(crate) fn new(update: Arc<Update>, api: BoxedApi) -> Self {
        Self {
            update,
            api,
            is_propagating: AtomicBool::new(true),
            state: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn update(&self) -> &Update {
        &self.update
    }

    pub(crate) fn is_propagating(&self) -> bool {
        self.is_propagating.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for UpdateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateContext")
            .field("update_id", &self.update.update_id)
            .field("is_propagating", &self.is_propagating())
            .finish_non_exhaustive()
    }
}

/// The context passed to a handler invocation.
///
/// # Example
///
/// ```rust,ignore
/// async fn greet(ctx: Arc<HandlerContext>) -> Result<(), BoxError> {
///     ctx.reply("hello").await?;
///     ctx.stop_propagation();
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct HandlerContext {
    shared: Arc<UpdateContext>,
    handler: Arc<str>,
    group: GroupId,
}

impl HandlerContext {
    pub(crate) fn new(shared: Arc<UpdateContext>, handler: Arc<str>, group: GroupId) -> Self {
        Self {
            shared,
            handler,
            group,
        }
    }

    /// Builds a standalone context, for driving a handler outside the engine.
    pub fn detached(update: Update, api: BoxedApi) -> Arc<Self> {
        let shared = Arc::new(UpdateContext::new(Arc::new(update), api));
        Arc::new(Self::new(shared, Arc::from("detached"), 0))
    }

    // ─── Update and API ─────────────────────────────────────────────────────

    pub fn update(&self) -> &Update {
        &self.shared.update
    }

    pub fn update_arc(&self) -> Arc<Update> {
        Arc::clone(&self.shared.update)
    }

    pub fn api(&self) -> &BoxedApi {
        &self.shared.api
    }

    /// Name of the registry entry being invoked.
    pub fn handler_name(&self) -> &str {
        &self.handler
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    // ─── Propagation ────────────────────────────────────────────────────────

    /// Skips the groups that have not started yet.
    ///
    /// Only effective under sequential isolation; concurrent handlers of the
    /// same update have all been started by the time this runs.
    pub fn stop_propagation(&self) {
        self.shared.is_propagating.store(false, Ordering::SeqCst);
    }

    pub fn is_propagating(&self) -> bool {
        self.shared.is_propagating()
    }

    // ─── Shared state ───────────────────────────────────────────────────────

    /// Stores a value visible to every later handler of this update.
    pub fn set_state<T: Any + Send + Sync>(&self, value: T) {
        self.shared
            .state
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get_state<T: Any + Clone + Send + Sync>(&self) -> Option<T> {
        self.shared
            .state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
            .cloned()
    }

    pub fn remove_state<T: Any + Send + Sync>(&self) -> Option<T> {
        self.shared
            .state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    // ─── Outbound helpers ───────────────────────────────────────────────────

    /// Replies to the update's message, or writes to its chat when there is
    /// no message to quote.
    pub async fn reply(&self, text: &str) -> Result<Message, BoxError> {
        let update = self.update();
        if let Some(message) = update.message() {
            return Ok(self.api().reply_to(message, text).await?);
        }
        let chat = update.chat().ok_or(ExtractError::Missing("chat"))?;
        Ok(self.api().send_message(chat.id, text).await?)
    }

    /// Answers the update's callback query.
    pub async fn answer_callback(&self, text: Option<&str>) -> Result<bool, BoxError> {
        match &self.update().kind {
            UpdateKind::CallbackQuery(query) => {
                Ok(self.api().answer_callback_query(&query.id, text).await?)
            }
            _ => Err(ExtractError::Missing("callback query").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tgbee_core::{Api, ApiResult};

    struct Echo;

    #[async_trait]
    impl Api for Echo {
        async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
            assert_eq!(method, "sendMessage");
            Ok(json!({
                "message_id": 99,
                "date": 0,
                "chat": {"id": params["chat_id"], "type": "private"},
                "text": params["text"],
            }))
        }
    }

    fn update() -> Update {
        serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 5,
                "date": 0,
                "chat": {"id": 3, "type": "private"},
                "text": "hi"
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_reply_goes_to_message_chat() {
        let ctx = HandlerContext::detached(update(), Arc::new(Echo));
        let sent = ctx.reply("pong").await.unwrap();
        assert_eq!(sent.chat.id, 3);
        assert_eq!(sent.text.as_deref(), Some("pong"));
        assert!(ctx.answer_callback(None).await.is_err());
    }

    #[test]
    fn test_state_and_propagation() {
        let ctx = HandlerContext::detached(update(), Arc::new(Echo));
        assert!(ctx.is_propagating());
        ctx.stop_propagation();
        assert!(!ctx.is_propagating());

        ctx.set_state(41u32);
        assert_eq!(ctx.get_state::<u32>(), Some(41));
        assert_eq!(ctx.remove_state::<u32>(), Some(41));
        assert_eq!(ctx.get_state::<u32>(), None);
    }
}
