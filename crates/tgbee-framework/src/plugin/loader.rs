use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::descriptor::{PluginDescriptor, discover};
use super::module::{PluginModule, find_module};
use super::registrar::PluginRegistrar;
use crate::error::{FrameworkError, FrameworkResult, PluginLoadError, PluginLoadErrorKind};
use crate::registry::HandlerRegistry;

/// Result of a load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Modules whose registrations were applied.
    pub loaded: Vec<String>,
    pub failed: Vec<PluginLoadError>,
    /// Disabled manifests and modules that were already loaded.
    pub skipped: Vec<String>,
    /// Handlers registered by this pass.
    pub handlers: usize,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.loaded.extend(other.loaded);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
        self.handlers += other.handlers;
    }
}

/// Populates a [`HandlerRegistry`] from plugin modules.
///
/// Modules come from the link-time [`PLUGIN_CATALOG`](super::PLUGIN_CATALOG),
/// selected and configured by the manifests of a plugin directory, or passed
/// explicitly to [`load_modules`](Self::load_modules). A failing module is
/// rolled back and reported; the others still load.
#[derive(Debug, Default)]
pub struct PluginLoader {
    dir: Option<PathBuf>,
    recursive: bool,
    required: bool,
    loaded: HashSet<String>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Makes a pass that loads zero modules an error.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn is_loaded(&self, module: &str) -> bool {
        self.loaded.contains(module)
    }

    /// Loads every manifest of the plugin directory, in lexical path order.
    pub async fn load(&mut self, registry: &mut HandlerRegistry) -> FrameworkResult<LoadReport> {
        let mut report = LoadReport::default();
        let Some(dir) = self.dir.clone() else {
            return self.check_required(report);
        };

        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            if self.required {
                return Err(FrameworkError::PluginDirMissing(dir));
            }
            warn!(path = %dir.display(), "plugin directory does not exist");
            return Ok(report);
        }

        let paths = discover(&dir, self.recursive)
            .await
            .map_err(|source| FrameworkError::PluginDirRead {
                path: dir.clone(),
                source,
            })?;
        debug!(path = %dir.display(), manifests = paths.len(), "discovered plugins");

        for path in paths {
            match PluginDescriptor::read(&path).await {
                Ok(descriptor) => report.merge(self.load_descriptor(registry, &descriptor)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err.kind, "plugin failed to load");
                    report.failed.push(err);
                }
            }
        }

        self.finish(report)
    }

    /// Loads the given modules without manifests.
    pub fn load_modules(
        &mut self,
        registry: &mut HandlerRegistry,
        modules: &[&PluginModule],
    ) -> FrameworkResult<LoadReport> {
        let mut report = LoadReport::default();
        for module in modules {
            let descriptor = PluginDescriptor::builtin(module);
            report.merge(self.load_descriptor(registry, &descriptor));
        }
        self.finish(report)
    }

    /// Loads one descriptor, resolving its module from the catalog.
    pub fn load_descriptor(
        &mut self,
        registry: &mut HandlerRegistry,
        descriptor: &PluginDescriptor,
    ) -> LoadReport {
        let mut report = LoadReport::default();
        let path = descriptor.path.as_path();

        if !descriptor.enabled {
            debug!(plugin = %descriptor.module, path = %path.display(), "plugin disabled");
            report.skipped.push(descriptor.module.clone());
            return report;
        }
        if self.loaded.contains(&descriptor.module) {
            debug!(plugin = %descriptor.module, path = %path.display(), "plugin already loaded");
            report.skipped.push(descriptor.module.clone());
            return report;
        }
        let Some(module) = find_module(&descriptor.module) else {
            let kind = PluginLoadErrorKind::UnknownModule(descriptor.module.clone());
            return Self::failed(report, path, kind);
        };

        match Self::apply(registry, descriptor, module) {
            Ok(count) => {
                info!(
                    plugin = module.name,
                    version = module.version,
                    path = %path.display(),
                    handlers = count,
                    "plugin loaded"
                );
                self.loaded.insert(descriptor.module.clone());
                report.loaded.push(descriptor.module.clone());
                report.handlers += count;
                report
            }
            Err(kind) => Self::failed(report, path, kind),
        }
    }

    /// Runs the module's registration function; undoes its registrations on
    /// failure.
    fn apply(
        registry: &mut HandlerRegistry,
        descriptor: &PluginDescriptor,
        module: &PluginModule,
    ) -> Result<usize, PluginLoadErrorKind> {
        let mut registrar = PluginRegistrar::new(registry, descriptor);
        let outcome = catch_unwind(AssertUnwindSafe(|| (module.register)(&mut registrar)));
        let summary = registrar.finish();

        let failure = match outcome {
            Ok(Ok(())) => summary.invalid.map(PluginLoadErrorKind::InvalidHandler),
            Ok(Err(err)) => Some(match summary.invalid {
                Some(invalid) => PluginLoadErrorKind::InvalidHandler(invalid),
                None => PluginLoadErrorKind::Registration(err),
            }),
            Err(panic) => Some(PluginLoadErrorKind::Panicked(panic_message(panic.as_ref()))),
        };

        if let Some(kind) = failure {
            for handle in summary.handles {
                registry.unregister(handle);
            }
            return Err(kind);
        }
        for name in &summary.missing {
            warn!(plugin = module.name, handler = %name, "allow-listed handler was never registered");
        }
        Ok(summary.handles.len())
    }

    fn failed(mut report: LoadReport, path: &Path, kind: PluginLoadErrorKind) -> LoadReport {
        let err = PluginLoadError::new(path, kind);
        warn!(path = %path.display(), error = %err.kind, "plugin failed to load");
        report.failed.push(err);
        report
    }

    fn check_required(&self, report: LoadReport) -> FrameworkResult<LoadReport> {
        if self.required && report.loaded.is_empty() && self.loaded.is_empty() {
            return Err(FrameworkError::NoPluginsLoaded {
                failed: report.failed.len(),
            });
        }
        Ok(report)
    }

    fn finish(&self, report: LoadReport) -> FrameworkResult<LoadReport> {
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            handlers = report.handlers,
            "plugin load finished"
        );
        self.check_required(report)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
