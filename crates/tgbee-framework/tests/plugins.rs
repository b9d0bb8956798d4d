mod common;

use common::{api, message};
use serde::Deserialize;
use tgbee_core::Message;
use tgbee_framework::filter;
use tgbee_framework::{
    BoxError, DispatchEngine, FrameworkError, HandlerRegistry, PluginLoadErrorKind, PluginLoader,
    PluginRegistrar, Registration,
};

async fn ping() -> &'static str {
    "pong"
}

async fn echo(msg: Message) -> String {
    msg.text.unwrap_or_default()
}

async fn help() -> &'static str {
    "/ping /echo"
}

#[derive(Debug, Default, Deserialize)]
struct EchoConfig {
    #[serde(default)]
    priority: i32,
}

fn ping_plugin(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
    r.register(Registration::new(filter::command(["ping"]), ping))?;
    Ok(())
}

fn echo_plugin(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
    let cfg: EchoConfig = r.config()?;
    r.register(Registration::new(filter::text(), echo).priority(cfg.priority))?;
    r.register(Registration::new(filter::command(["help"]), help))?;
    Ok(())
}

fn broken_plugin(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
    r.register(Registration::new(filter::command(["boom"]), ping))?;
    panic!("plugin crashed during load");
}

tgbee_framework::define_plugin! {
    static PING = { name: "it-ping", register: ping_plugin };
}

tgbee_framework::define_plugin! {
    static ECHO = {
        name: "it-echo",
        desc: "echoes text",
        version: "2.0.0",
        register: echo_plugin,
    };
}

tgbee_framework::define_plugin! {
    static BROKEN = { name: "it-broken", register: broken_plugin };
}

fn write(dir: &std::path::Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

#[tokio::test]
async fn broken_plugin_does_not_prevent_the_others() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a_ping.toml", "module = \"it-ping\"\n");
    write(dir.path(), "b_broken.toml", "module = \"it-broken\"\n");
    write(
        dir.path(),
        "c_echo.toml",
        "module = \"it-echo\"\nhandlers = [\"echo\"]\n[config]\npriority = 3\n",
    );
    write(dir.path(), "_disabled_by_name.toml", "module = \"it-ping\"\n");
    write(dir.path(), "notes.txt", "not a manifest");

    let mut registry = HandlerRegistry::new();
    let report = PluginLoader::new()
        .dir(dir.path())
        .load(&mut registry)
        .await
        .unwrap();

    assert_eq!(report.loaded, vec!["it-ping", "it-echo"]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].path.ends_with("b_broken.toml"));
    assert!(matches!(
        &report.failed[0].kind,
        PluginLoadErrorKind::Panicked(msg) if msg.contains("crashed")
    ));
    // "boom" was rolled back, "help" was excluded by the allow-list.
    assert_eq!(report.handlers, 2);
    assert_eq!(registry.len(), 2);

    let (recorder, api) = api();
    let engine = DispatchEngine::new(api, registry);
    engine.dispatch(message(1, "/ping")).await.unwrap();
    engine.dispatch(message(2, "/boom")).await.unwrap();
    let texts: Vec<String> = recorder
        .calls
        .lock()
        .iter()
        .map(|(_, params)| params["text"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(texts, vec!["pong", "/boom"]);
}

#[tokio::test]
async fn manifest_errors_are_reported_per_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ok.toml", "module = \"it-ping\"\n");
    write(dir.path(), "typo.toml", "modul = \"it-ping\"\n");
    write(dir.path(), "unknown.toml", "module = \"it-missing\"\n");
    write(dir.path(), "off.toml", "module = \"it-echo\"\nenabled = false\n");

    let mut registry = HandlerRegistry::new();
    let report = PluginLoader::new()
        .dir(dir.path())
        .load(&mut registry)
        .await
        .unwrap();

    assert_eq!(report.loaded, vec!["it-ping"]);
    assert_eq!(report.skipped, vec!["it-echo"]);
    let kinds: Vec<_> = report.failed.iter().map(|e| &e.kind).collect();
    assert!(matches!(kinds[0], PluginLoadErrorKind::Manifest(_)));
    assert!(matches!(
        kinds[1],
        PluginLoadErrorKind::UnknownModule(name) if name == "it-missing"
    ));
}

#[tokio::test]
async fn nested_manifests_need_recursive_discovery() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("extra")).unwrap();
    write(&dir.path().join("extra"), "ping.toml", "module = \"it-ping\"\n");

    let mut registry = HandlerRegistry::new();
    let flat = PluginLoader::new()
        .dir(dir.path())
        .load(&mut registry)
        .await
        .unwrap();
    assert!(flat.loaded.is_empty());

    let deep = PluginLoader::new()
        .dir(dir.path())
        .recursive(true)
        .load(&mut registry)
        .await
        .unwrap();
    assert_eq!(deep.loaded, vec!["it-ping"]);
}

#[tokio::test]
async fn required_loading_fails_without_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = HandlerRegistry::new();

    let missing = PluginLoader::new()
        .dir(dir.path().join("nope"))
        .required(true)
        .load(&mut registry)
        .await;
    assert!(matches!(missing, Err(FrameworkError::PluginDirMissing(_))));

    write(dir.path(), "broken.toml", "module = \"it-broken\"\n");
    let none = PluginLoader::new()
        .dir(dir.path())
        .required(true)
        .load(&mut registry)
        .await;
    assert!(matches!(none, Err(FrameworkError::NoPluginsLoaded { failed: 1 })));
    assert!(registry.is_empty());
}
