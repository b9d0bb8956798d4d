//! Echo Bot Example
//!
//! A small bot built from plugins. The `echo` plugin below is compiled into
//! this binary; `moderation` and `welcome` come from the
//! `tgbee-plugin-moderation` crate. Which of them run, in which group and
//! with which settings is decided by the manifests in `plugins/`.
//!
//! ```text
//! group -10  moderation   removes messages with banned words, stops propagation
//! group   0  echo         /ping /echo /info /menu /help, button presses
//! group   0  welcome      greets new members
//! group  10  echo:log     logs every text message
//! ```
//!
//! # Usage
//!
//! ```bash
//! export TGBEE_BOT__TOKEN=123456:ABC...
//! cargo run --package echo-bot -- --config demos/echo_bot/tgbee.toml
//! cargo run --package echo-bot -- --list-plugins
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tgbee::core::Api;
use tgbee::framework::plugin::PLUGIN_CATALOG;
use tgbee::prelude::*;
use tgbee::runtime::ConfigLoader;
use tgbee::runtime::config::validate_config;
use tracing::{debug, info};

/// Runs the echo bot.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file; defaults to tgbee.toml in the working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. "production".
    #[arg(short, long)]
    profile: Option<String>,

    /// Plugin manifest directory, overriding the configuration.
    #[arg(long)]
    plugins: Option<PathBuf>,

    /// Print the compiled-in plugin modules and exit.
    #[arg(long)]
    list_plugins: bool,
}

// ============================================================================
// Handler Functions (Axum-style)
// ============================================================================

async fn ping() -> &'static str {
    "Pong! 🏓"
}

async fn echo(args: CommandArgs) -> String {
    if args.is_empty() {
        "Usage: /echo <text>".to_string()
    } else {
        args.args
    }
}

async fn help() -> &'static str {
    r"╭─────────────────────────────╮
│     Echo Bot - Commands     │
├─────────────────────────────┤
│ /echo <text> - Echo text    │
│ /ping        - Pong!        │
│ /info        - Message info │
│ /menu        - Buttons      │
│ /help        - This help    │
╰─────────────────────────────╯"
}

async fn message_info(msg: Message) -> String {
    let from = msg
        .from_user
        .as_ref()
        .map_or_else(|| "unknown".to_string(), |u| format!("{} ({})", u.full_name(), u.id));
    format!(
        "📋 Message Info\n\
        • Chat: {} ({:?})\n\
        • From: {}\n\
        • Message ID: {}",
        msg.chat.id, msg.chat.kind, from, msg.message_id
    )
}

/// Sends a message with an inline keyboard through the raw API.
async fn menu(ctx: Arc<HandlerContext>, msg: Message) -> Result<(), BoxError> {
    let params = serde_json::json!({
        "chat_id": msg.chat.id,
        "text": "Pick one:",
        "reply_markup": {
            "inline_keyboard": [[
                {"text": "🐝 Bee", "callback_data": "echo:bee"},
                {"text": "🍯 Honey", "callback_data": "echo:honey"},
            ]]
        }
    });
    ctx.api().call("sendMessage", params).await?;
    Ok(())
}

async fn on_button(ctx: Arc<HandlerContext>, query: CallbackQuery) -> Result<(), BoxError> {
    let choice = query
        .data
        .as_deref()
        .and_then(|d| d.strip_prefix("echo:"))
        .unwrap_or("nothing");
    ctx.answer_callback(Some(&format!("You picked {choice}"))).await?;
    Ok(())
}

async fn log_message(msg: Message) {
    let nickname = msg.from_user.as_ref().map_or("Unknown", |u| u.first_name.as_str());
    info!(
        chat = msg.chat.id,
        "[{:?}] {}: {}",
        msg.chat.kind,
        nickname,
        msg.text.as_deref().unwrap_or_default()
    );
}

// ============================================================================
// Plugin
// ============================================================================

fn echo_plugin(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
    r.register(Registration::new(filter::command(["ping"]), ping).name("ping"))?;
    r.register(Registration::new(filter::command(["echo"]), echo).name("echo"))?;
    r.register(Registration::new(filter::command(["help", "start"]), help).name("help"))?;
    r.register(Registration::new(filter::command(["info"]), message_info).name("info"))?;
    r.register(Registration::new(filter::command(["menu"]), menu).name("menu"))?;
    r.register(
        Registration::new(filter::callback_data_prefix("echo:"), on_button).name("button"),
    )?;
    r.register(
        Registration::new(filter::text() & !filter::command(["echo"]), log_message)
            .name("log")
            .group(10),
    )?;
    Ok(())
}

define_plugin! {
    static ECHO = {
        name: "echo",
        desc: "echo, ping and friends",
        register: echo_plugin,
    };
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn list_plugins() {
    for module in PLUGIN_CATALOG.iter() {
        println!("{:<12} {:<8} {}", module.name, module.version, module.desc);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.list_plugins {
        list_plugins();
        return Ok(());
    }

    let mut loader = ConfigLoader::new().with_current_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    if let Some(profile) = args.profile {
        loader = loader.profile(profile);
    }
    let mut config = loader.load()?;
    if let Some(dir) = args.plugins {
        config.plugins.dir = dir;
    }
    validate_config(&config)?;

    let runtime = BeeRuntime::from_config(&config);
    debug!(
        bundled = ?[
            ECHO.name,
            tgbee_plugin_moderation::MODERATION.name,
            tgbee_plugin_moderation::WELCOME.name,
        ],
        "plugin modules linked"
    );

    runtime.run().await?;
    Ok(())
}
