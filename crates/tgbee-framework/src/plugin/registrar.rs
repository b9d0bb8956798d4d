use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::descriptor::PluginDescriptor;
use crate::error::{BoxError, InvalidHandlerError};
use crate::registry::{GroupId, HandlerHandle, HandlerRegistry, Registration};

/// Registry access handed to a plugin's registration function.
///
/// Only exists during the load phase; the plugin keeps no reference to the
/// registry afterwards.
pub struct PluginRegistrar<'a> {
    registry: &'a mut HandlerRegistry,
    plugin: &'a str,
    config: &'a Value,
    group: Option<GroupId>,
    allow: Option<HashSet<&'a str>>,
    seen: HashSet<String>,
    handles: Vec<HandlerHandle>,
    invalid: Option<InvalidHandlerError>,
}

/// What a registrar did, collected after the registration function returns.
pub(crate) struct RegistrarSummary {
    pub handles: Vec<HandlerHandle>,
    pub invalid: Option<InvalidHandlerError>,
    /// Allow-listed names the module never registered.
    pub missing: Vec<String>,
}

impl<'a> PluginRegistrar<'a> {
    pub(crate) fn new(registry: &'a mut HandlerRegistry, descriptor: &'a PluginDescriptor) -> Self {
        Self {
            registry,
            plugin: &descriptor.module,
            config: &descriptor.config,
            group: descriptor.group,
            allow: descriptor
                .handlers
                .as_ref()
                .map(|names| names.iter().map(String::as_str).collect()),
            seen: HashSet::new(),
            handles: Vec::new(),
            invalid: None,
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    /// The manifest's `[config]` table, `Value::Null` when absent.
    pub fn raw_config(&self) -> &Value {
        self.config
    }

    /// Deserializes the `[config]` table, or `T::default()` when absent.
    pub fn config<T: DeserializeOwned + Default>(&self) -> Result<T, BoxError> {
        if self.config.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.config.clone())?)
    }

    /// Registers a handler of this plugin.
    ///
    /// Returns `Ok(None)` when the manifest's allow-list excludes the handler.
    /// Registrations without an explicit group land in the manifest's group.
    pub fn register(
        &mut self,
        registration: Registration,
    ) -> Result<Option<HandlerHandle>, InvalidHandlerError> {
        let name = registration.handler_name().map(str::to_string);
        if let Some(allow) = &self.allow {
            let allowed = name.as_deref().is_some_and(|n| allow.contains(n));
            if !allowed {
                debug!(plugin = self.plugin, handler = ?name, "handler not in allow-list, skipped");
                return Ok(None);
            }
        }
        if let Some(name) = name {
            self.seen.insert(name);
        }

        match self.registry.register(registration.default_group(self.group)) {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(Some(handle))
            }
            Err(err) => {
                self.invalid.get_or_insert_with(|| err.clone());
                Err(err)
            }
        }
    }

    pub(crate) fn finish(self) -> RegistrarSummary {
        let missing = self
            .allow
            .map(|allow| {
                let mut missing: Vec<String> = allow
                    .into_iter()
                    .filter(|n| !self.seen.contains(*n))
                    .map(str::to_string)
                    .collect();
                missing.sort();
                missing
            })
            .unwrap_or_default();
        RegistrarSummary {
            handles: self.handles,
            invalid: self.invalid,
            missing,
        }
    }
}
