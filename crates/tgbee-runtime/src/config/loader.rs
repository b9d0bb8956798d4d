//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML configuration files (`tgbee.toml`, `config.toml`)
//! - `yaml-config`: enables YAML configuration files (`tgbee.yaml`, `tgbee.yml`, etc.)
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic defaults ([`ConfigLoader::merge`])
//! 3. Profile-specific config file (`tgbee.{profile}.toml` / `tgbee.{profile}.yaml`)
//! 4. Main config file (`tgbee.toml` / `tgbee.yaml`)
//! 5. Environment variables (`TGBEE_*`)
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `TGBEE_` prefix with `__` as separator:
//!
//! - `TGBEE_BOT__TOKEN=123:abc` → `bot.token = "123:abc"`
//! - `TGBEE_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `TGBEE_DISPATCH__MAX_IN_FLIGHT=8` → `dispatch.max_in_flight = 8`
//!
//! # Example
//!
//! ```rust,ignore
//! use tgbee_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/tgbee.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::TgbeeConfig;

/// File names looked up in each search directory, in order. Names whose
/// format feature is disabled are skipped.
const CANDIDATES: &[&str] = &[
    "tgbee.toml",
    "config.toml",
    "tgbee.yaml",
    "tgbee.yml",
    "config.yaml",
    "config.yml",
];

fn format_enabled(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => cfg!(feature = "toml-config"),
        Some("yaml" | "yml") => cfg!(feature = "yaml-config"),
        _ => false,
    }
}

/// Selects the `tgbee.<profile>.<ext>` overlay.
///
/// Names are case-insensitive; `dev` and `prod` are short for
/// `development` and `production`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile(String);

impl Profile {
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        Self(match name.as_str() {
            "" | "dev" => "development".to_string(),
            "prod" => "production".to_string(),
            _ => name,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads `TGBEE_PROFILE`, defaulting to `development`.
    pub fn from_env() -> Self {
        std::env::var("TGBEE_PROFILE")
            .map(|p| Self::new(&p))
            .unwrap_or_default()
    }

    /// The overlay sitting next to `base`: `tgbee.toml` → `tgbee.<profile>.toml`.
    fn overlay_of(&self, base: &Path) -> Option<PathBuf> {
        let stem = base.file_stem()?.to_str()?;
        let ext = base.extension()?.to_str()?;
        Some(base.with_file_name(format!("{stem}.{}.{ext}", self.0)))
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new("development")
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a [`TgbeeConfig`] from layered sources.
pub struct ConfigLoader {
    /// Programmatic defaults, merged right above the built-in ones.
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Replaces the search when set.
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::new(&profile.into());
        self
    }

    /// Adds a directory to look for configuration files in.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/tgbee` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("tgbee")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching. Its profile overlay is
    /// not consulted.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a complete configuration programmatically. Files and the
    /// environment still override it.
    pub fn merge(mut self, config: TgbeeConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    pub fn load(self) -> ConfigResult<TgbeeConfig> {
        let profile = self.profile.clone();
        let config: TgbeeConfig = self.build_figment()?.extract()?;

        debug!(
            profile = %profile,
            mode = ?config.mode,
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(TgbeeConfig::default()))
            .merge(std::mem::take(&mut self.overrides));

        let files = match self.config_file.take() {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path)),
            Some(path) => vec![path],
            None => self.discover(),
        };
        for path in &files {
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, path)?;
        }

        if self.load_env {
            trace!("Loading environment variables with TGBEE_ prefix");
            figment = figment.merge(Env::prefixed("TGBEE_").split("__"));
        }
        Ok(figment)
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|d| d.join("tgbee")))
            .collect()
    }

    /// The first candidate found on the search paths, preceded by its
    /// profile overlay when that exists too.
    fn discover(&self) -> Vec<PathBuf> {
        let search_paths = self.resolve_search_paths();
        let base = search_paths
            .iter()
            .flat_map(|dir| CANDIDATES.iter().map(move |name| dir.join(name)))
            .find(|path| format_enabled(path) && path.is_file());

        let Some(base) = base else {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
            return Vec::new();
        };
        match self.profile.overlay_of(&base).filter(|p| p.is_file()) {
            Some(overlay) => vec![overlay, base],
            None => vec![base],
        }
    }
}

/// Merges one file, picking the provider by extension.
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Loads configuration from the default locations and environment.
pub fn load_config() -> ConfigResult<TgbeeConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path` plus the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<TgbeeConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::{IngestMode, LogLevel};

    #[test]
    fn test_default_config() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::new()
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.polling.timeout_secs, 30);
            assert_eq!(config.dispatch.max_in_flight, 64);
            Ok(())
        });
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("TGBEE_PROFILE", "Prod");
            assert_eq!(Profile::from_env().as_str(), "production");
            jail.set_env("TGBEE_PROFILE", "staging");
            assert_eq!(Profile::from_env().as_str(), "staging");
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_layering_file_profile_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tgbee.toml",
                r#"
                mode = "webhook"
                [webhook]
                port = 8443
                [logging]
                level = "warn"
                "#,
            )?;
            jail.create_file(
                "tgbee.staging.toml",
                r#"
                [dispatch]
                max_in_flight = 4
                [logging]
                level = "error"
                "#,
            )?;
            jail.set_env("TGBEE_BOT__TOKEN", "123:abc");
            jail.set_env("TGBEE_POLLING__LIMIT", "10");

            let config = ConfigLoader::new()
                .profile("staging")
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.mode, IngestMode::Webhook);
            assert_eq!(config.webhook.port, Some(8443));
            // the main file wins over the profile file
            assert_eq!(config.logging.level, LogLevel::Warn);
            assert_eq!(config.dispatch.max_in_flight, 4);
            assert_eq!(config.bot.token.as_deref(), Some("123:abc"));
            assert_eq!(config.polling.limit, 10);
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_defaults_sit_below_env() {
        Jail::expect_with(|jail| {
            let mut base = TgbeeConfig::default();
            base.logging.level = LogLevel::Trace;
            base.dispatch.queue_capacity = 16;
            jail.set_env("TGBEE_LOGGING__LEVEL", "debug");

            let config = ConfigLoader::new().merge(base).load().map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.dispatch.queue_capacity, 16);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .file("/definitely/not/here/tgbee.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
