//! Plugin loading.
//!
//! A plugin is a compiled-in module declared with
//! [`define_plugin!`](crate::define_plugin). Declaring it adds a
//! [`PluginModule`] to the link-time [`PLUGIN_CATALOG`]; nothing is
//! registered until a [`PluginLoader`] runs the module's registration
//! function against a registry.
//!
//! ```text
//! plugins/*.toml ──discover──▶ PluginDescriptor ──catalog──▶ PluginModule
//!                                                     │
//!                      PluginRegistrar ◀──register()──┘
//!                            │
//!                            ▼
//!                     HandlerRegistry
//! ```

// ─── Submodules ──────────────────────────────────────────────────────────────
mod descriptor;
mod loader;
mod module;
mod registrar;

// ─── Re-exports ──────────────────────────────────────────────────────────────
pub use descriptor::{PluginDescriptor, discover};
pub use loader::{LoadReport, PluginLoader};
pub use module::{PLUGIN_CATALOG, PluginModule, RegisterFn, find_module};
pub use registrar::PluginRegistrar;

// ─── Macro-internal re-export (needed by define_plugin! at call sites) ───────
#[doc(hidden)]
pub use linkme as __linkme;

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tgbee_core::UpdateType;

    use super::*;
    use crate::error::{BoxError, PluginLoadErrorKind};
    use crate::filter;
    use crate::registry::{HandlerRegistry, Registration};

    async fn hello() {}
    async fn bye() {}

    #[derive(Debug, Default, Deserialize)]
    struct GreeterConfig {
        #[serde(default)]
        loud: bool,
    }

    fn greeter(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
        let cfg: GreeterConfig = r.config()?;
        let priority = if cfg.loud { -1 } else { 0 };
        r.register(Registration::new(filter::command(["hello"]), hello).priority(priority))?;
        r.register(Registration::new(filter::command(["bye"]), bye))?;
        Ok(())
    }

    fn half_broken(r: &mut PluginRegistrar<'_>) -> Result<(), BoxError> {
        r.register(Registration::new(filter::text(), hello))?;
        Err("database unavailable".into())
    }

    crate::define_plugin! {
        static GREETER = {
            name: "unit-greeter",
            desc: "greets",
            register: greeter,
        };
    }

    crate::define_plugin! {
        static HALF_BROKEN = {
            name: "unit-half-broken",
            register: half_broken,
        };
    }

    #[test]
    fn test_catalog_lookup() {
        let m = find_module("unit-greeter").unwrap();
        assert_eq!(m.desc, "greets");
        assert_eq!(m.version, env!("CARGO_PKG_VERSION"));
        assert!(find_module("nope").is_none());
    }

    #[test]
    fn test_failed_module_is_rolled_back() {
        let mut registry = HandlerRegistry::new();
        let mut loader = PluginLoader::new();
        let report = loader
            .load_modules(&mut registry, &[&HALF_BROKEN, &GREETER])
            .unwrap();
        assert_eq!(report.loaded, vec!["unit-greeter"]);
        assert_eq!(report.handlers, 2);
        assert!(matches!(
            report.failed[0].kind,
            PluginLoadErrorKind::Registration(_)
        ));
        assert_eq!(registry.len(), 2);

        let again = loader.load_modules(&mut registry, &[&GREETER]).unwrap();
        assert_eq!(again.skipped, vec!["unit-greeter"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_manifest_allow_list_group_and_config() {
        let descriptor = PluginDescriptor::parse(
            "plugins/greeter.toml",
            r#"
            module = "unit-greeter"
            handlers = ["hello"]
            group = 4
            [config]
            loud = true
            "#,
        )
        .unwrap();

        let mut registry = HandlerRegistry::new();
        let report = PluginLoader::new().load_descriptor(&mut registry, &descriptor);
        assert_eq!(report.handlers, 1);

        let entries = registry.entries_for(UpdateType::Message);
        let entry = entries.iter().next().unwrap();
        assert_eq!(entry.name(), "hello");
        assert_eq!(entry.group(), 4);
        assert_eq!(entry.priority(), -1);
    }
}
