//! Plugin manifests and directory discovery.
//!
//! A plugin directory holds one TOML manifest per plugin instance:
//!
//! ```toml
//! # plugins/10-moderation.toml
//! module = "moderation"        # defaults to the file stem
//! handlers = ["ban", "warn"]   # optional allow-list
//! group = 1                    # default group for the module's handlers
//! enabled = true
//!
//! [config]
//! banned_words = ["spam"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use super::module::PluginModule;
use crate::error::{PluginLoadError, PluginLoadErrorKind};
use crate::registry::GroupId;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    module: Option<String>,
    handlers: Option<Vec<String>>,
    group: Option<GroupId>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    config: toml::Table,
}

fn enabled_by_default() -> bool {
    true
}

/// A discovered plugin, consumed by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    pub path: PathBuf,
    /// Catalog name of the module to load.
    pub module: String,
    /// When set, only these handler names are registered.
    pub handlers: Option<Vec<String>>,
    /// Group for registrations that do not choose one.
    pub group: Option<GroupId>,
    pub enabled: bool,
    /// The `[config]` table, `Value::Null` when absent.
    pub config: Value,
}

impl PluginDescriptor {
    /// Parses manifest text. `path` supplies the default module name.
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self, PluginLoadError> {
        let path = path.into();
        let manifest: Manifest = match toml::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                let kind = PluginLoadErrorKind::Manifest(e.message().to_string());
                return Err(PluginLoadError::new(path, kind));
            }
        };
        let module = match manifest.module {
            Some(m) => m,
            None => match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => {
                    return Err(PluginLoadError::new(
                        path,
                        PluginLoadErrorKind::Manifest("cannot derive module name".into()),
                    ));
                }
            },
        };
        let config = if manifest.config.is_empty() {
            Value::Null
        } else {
            serde_json::to_value(&manifest.config).map_err(|e| {
                PluginLoadError::new(path.clone(), PluginLoadErrorKind::Manifest(e.to_string()))
            })?
        };
        Ok(Self {
            path,
            module,
            handlers: manifest.handlers,
            group: manifest.group,
            enabled: manifest.enabled,
            config,
        })
    }

    pub async fn read(path: &Path) -> Result<Self, PluginLoadError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PluginLoadError::new(path, e))?;
        Self::parse(path, &text)
    }

    /// Descriptor for a module loaded without a manifest.
    pub fn builtin(module: &PluginModule) -> Self {
        Self {
            path: PathBuf::from("<builtin>").join(module.name),
            module: module.name.to_string(),
            handlers: None,
            group: None,
            enabled: true,
            config: Value::Null,
        }
    }
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

/// Lists manifest files under `dir`, sorted lexically by path.
pub async fn discover(dir: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_ignored(name) {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if path.extension().is_some_and(|ext| ext == "toml") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_manifest() {
        let d = PluginDescriptor::parse(
            "plugins/greeter.toml",
            r#"
            handlers = ["hello"]
            group = 2

            [config]
            greeting = "hi"
            "#,
        )
        .unwrap();
        assert_eq!(d.module, "greeter");
        assert_eq!(d.handlers, Some(vec!["hello".to_string()]));
        assert_eq!(d.group, Some(2));
        assert!(d.enabled);
        assert_eq!(d.config, json!({"greeting": "hi"}));

        let bad = PluginDescriptor::parse("x.toml", "modul = 'typo'").unwrap_err();
        assert!(matches!(bad.kind, PluginLoadErrorKind::Manifest(_)));
    }

    #[tokio::test]
    async fn test_discover_order_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.toml", "a.toml", "_off.toml", ".hidden.toml", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.toml"), "").unwrap();

        let names = |paths: Vec<PathBuf>| -> Vec<String> {
            paths
                .iter()
                .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
                .collect()
        };
        assert_eq!(
            names(discover(dir.path(), false).await.unwrap()),
            vec!["a.toml", "b.toml"]
        );
        assert_eq!(
            names(discover(dir.path(), true).await.unwrap()),
            vec!["a.toml", "b.toml", "nested/c.toml"]
        );
    }
}
