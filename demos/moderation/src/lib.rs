//! Moderation plugins for tgbee.
//!
//! Two modules, each enabled by a manifest in the bot's plugin directory:
//!
//! | Module | Handler | Does |
//! |--------|---------|------|
//! | `moderation` | `remove_banned` | Deletes group messages containing a banned word and posts a warning |
//! | `welcome` | `greet_members` | Greets users joining a group |
//!
//! ```toml
//! # plugins/moderation.toml
//! module = "moderation"
//! group = -10
//!
//! [config]
//! banned_words = ["spam", "casino"]
//! warning = "{name}, that word is not allowed here."
//! ```
//!
//! Run the engine with `isolation = "sequential"` to keep later groups from
//! answering a removed message: `remove_banned` stops propagation.

use std::sync::Arc;

use serde::Deserialize;
use tgbee_core::{ApiExt, Message};
use tgbee_framework::filter::{self, Content};
use tgbee_framework::{BoxError, HandlerContext, PluginRegistrar, Registration, define_plugin};
use tracing::{info, warn};

// ============================================================================
// moderation
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Matched as whole words, ignoring case.
    pub banned_words: Vec<String>,
    /// `{name}` is replaced with the sender's first name.
    pub warning: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            banned_words: Vec::new(),
            warning: "{name}, your message was removed.".to_string(),
        }
    }
}

impl ModerationConfig {
    fn pattern(&self) -> Option<String> {
        let words: Vec<String> = self
            .banned_words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();
        (!words.is_empty()).then(|| format!(r"(?i)\b(?:{})\b", words.join("|")))
    }
}

fn moderation(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
    let config: ModerationConfig = r.config()?;
    let Some(pattern) = config.pattern() else {
        warn!(plugin = r.plugin_name(), "no banned words configured");
        return Ok(());
    };

    let warning: Arc<str> = Arc::from(config.warning);
    let remove_banned = move |ctx: Arc<HandlerContext>, msg: Message| {
        let warning = Arc::clone(&warning);
        async move {
            ctx.stop_propagation();
            ctx.api().delete_message(msg.chat.id, msg.message_id).await?;

            let name = msg
                .from_user
                .as_ref()
                .map_or("someone", |u| u.first_name.as_str());
            info!(chat = msg.chat.id, message = msg.message_id, user = name, "removed message");
            ctx.api()
                .send_message(msg.chat.id, &warning.replace("{name}", name))
                .await?;
            Ok::<_, BoxError>(())
        }
    };

    let filter = filter::group() & filter::regex(&pattern)?;
    r.register(
        Registration::new(filter, remove_banned)
            .name("remove_banned")
            .priority(-100),
    )?;
    Ok(())
}

define_plugin! {
    /// Removes messages with banned words.
    pub static MODERATION = {
        name: "moderation",
        desc: "removes group messages containing banned words",
        register: moderation,
    };
}

// ============================================================================
// welcome
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WelcomeConfig {
    /// `{names}` is replaced with the joined members' first names.
    pub greeting: String,
    pub greet_bots: bool,
}

impl Default for WelcomeConfig {
    fn default() -> Self {
        Self {
            greeting: "Welcome, {names}!".to_string(),
            greet_bots: false,
        }
    }
}

fn welcome(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
    let config: WelcomeConfig = r.config()?;
    let greeting: Arc<str> = Arc::from(config.greeting);
    let greet_bots = config.greet_bots;

    let greet_members = move |msg: Message| {
        let greeting = Arc::clone(&greeting);
        async move {
            let names: Vec<&str> = msg
                .new_chat_members
                .iter()
                .filter(|u| greet_bots || !u.is_bot)
                .map(|u| u.first_name.as_str())
                .collect();
            (!names.is_empty()).then(|| greeting.replace("{names}", &names.join(", ")))
        }
    };

    r.register(
        Registration::new(filter::has(Content::NewChatMembers), greet_members).name("greet_members"),
    )?;
    Ok(())
}

define_plugin! {
    /// Greets new group members.
    pub static WELCOME = {
        name: "welcome",
        desc: "greets users joining a group",
        register: welcome,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tgbee_core::{Api, ApiResult, Update};
    use tgbee_framework::{
        DispatchConfig, DispatchEngine, HandlerRegistry, Isolation, PluginDescriptor, PluginLoader,
    };

    #[derive(Default)]
    struct Calls(Mutex<Vec<(String, Value)>>);

    #[async_trait]
    impl Api for Calls {
        async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
            self.0.lock().push((method.to_string(), params));
            Ok(match method {
                "sendMessage" => json!({
                    "message_id": 99,
                    "date": 0,
                    "chat": {"id": -100, "type": "supergroup"}
                }),
                _ => json!(true),
            })
        }
    }

    fn group_update(update_id: i64, message: Value) -> Update {
        let mut message = message;
        message["message_id"] = json!(update_id);
        message["date"] = json!(0);
        message["chat"] = json!({"id": -100, "type": "supergroup", "title": "bees"});
        serde_json::from_value(json!({"update_id": update_id, "message": message})).unwrap()
    }

    fn load(manifest: &str) -> (Arc<Calls>, DispatchEngine) {
        let descriptor = PluginDescriptor::parse("plugins/test.toml", manifest).unwrap();
        let mut registry = HandlerRegistry::new();
        let report = PluginLoader::new().load_descriptor(&mut registry, &descriptor);
        assert!(report.failed.is_empty(), "{:?}", report.failed);

        let echo = |msg: Message| async move { msg.text };
        registry
            .register(Registration::new(filter::text(), echo).name("echo").group(0))
            .unwrap();

        let calls = Arc::new(Calls::default());
        let engine = DispatchEngine::builder(calls.clone())
            .registry(registry)
            .config(DispatchConfig {
                isolation: Isolation::Sequential,
                ..Default::default()
            })
            .build();
        (calls, engine)
    }

    #[test]
    fn test_pattern_escapes_words() {
        let config = ModerationConfig {
            banned_words: vec!["c++".into(), " ".into(), "Spam".into()],
            ..Default::default()
        };
        assert_eq!(config.pattern().unwrap(), r"(?i)\b(?:c\+\+|Spam)\b");
        assert!(ModerationConfig::default().pattern().is_none());
    }

    #[tokio::test]
    async fn test_banned_word_is_removed_and_stops_later_groups() {
        let (calls, engine) = load(
            r#"
            module = "moderation"
            group = -10
            [config]
            banned_words = ["casino"]
            warning = "no, {name}"
            "#,
        );

        let update = group_update(
            7,
            json!({"from": {"id": 1, "first_name": "Bob"}, "text": "best CASINO in town"}),
        );
        let outcome = engine.dispatch(update).await.unwrap();
        assert_eq!(outcome.matched, 1);
        assert!(outcome.stopped_early);

        let calls = calls.0.lock();
        let methods: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, vec!["deleteMessage", "sendMessage"]);
        assert_eq!(calls[0].1["message_id"], 7);
        assert_eq!(calls[1].1["text"], "no, Bob");
    }

    #[tokio::test]
    async fn test_clean_message_falls_through() {
        let (calls, engine) = load(
            r#"
            module = "moderation"
            group = -10
            [config]
            banned_words = ["casino"]
            "#,
        );

        let update = group_update(8, json!({"from": {"id": 1, "first_name": "Bob"}, "text": "casinos"}));
        let outcome = engine.dispatch(update).await.unwrap();
        assert_eq!(outcome.matched, 1);
        assert_eq!(calls.0.lock()[0].1["text"], "casinos");
    }

    #[tokio::test]
    async fn test_welcome_skips_bots() {
        let (calls, engine) = load(r#"module = "welcome""#);
        let update = group_update(
            9,
            json!({"new_chat_members": [
                {"id": 2, "first_name": "Ann"},
                {"id": 3, "first_name": "robot", "is_bot": true},
                {"id": 4, "first_name": "Cy"}
            ]}),
        );
        engine.dispatch(update).await.unwrap();
        assert_eq!(calls.0.lock()[0].1["text"], "Welcome, Ann, Cy!");
    }
}
