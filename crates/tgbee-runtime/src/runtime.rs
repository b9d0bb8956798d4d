//! Process orchestration.
//!
//! [`BeeRuntime`] wires the layers together for one run:
//!
//! ```text
//! config ─▶ logging
//!        ─▶ PluginLoader ──▶ HandlerRegistry ──▶ DispatchEngine
//!        ─▶ PollingSource(BotApiClient) | PushSource(WebhookServer) ──┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tgbee_runtime::BeeRuntime;
//!
//! // Loads tgbee.toml from the current directory, profile and TGBEE_* env.
//! let runtime = BeeRuntime::builder().build()?;
//! runtime.run().await?;
//!
//! // Custom configuration path
//! let runtime = BeeRuntime::builder()
//!     .config_file("deploy/tgbee.toml")
//!     .profile("production")
//!     .build()?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tgbee_core::{Api, BoxedApi, BoxedFetcher, UpdateFetcher};
use tgbee_framework::{
    DispatchEngine, EngineError, ErrorObserver, FileWatermarkStore, FrameworkError,
    HandlerExecutionError, HandlerHandle, HandlerRegistry, InvalidHandlerError, LoadReport,
    PluginLoader, PluginModule, PollingConfig, PollingSource, Registration, UpdateSource,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::validation::parse_update_types;
use crate::config::{
    ConfigError, ConfigLoader, ConfigResult, IngestMode, PollingSettings, TgbeeConfig,
    validate_config,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Runs a bot: plugins, dispatch engine and ingestion, until shutdown.
///
/// # Simple Usage
///
/// ```rust,ignore
/// let mut runtime = BeeRuntime::builder().build()?;
/// runtime.register(Registration::new(filter::command(["start"]), start))?;
/// runtime.run().await?;
/// ```
///
/// Collaborators default to the HTTP transports built from `bot.*`; tests
/// and embedders inject their own with [`with_api`](Self::with_api) and
/// [`with_fetcher`](Self::with_fetcher).
pub struct BeeRuntime {
    config: TgbeeConfig,
    registry: HandlerRegistry,
    /// Modules loaded in addition to the plugin directory.
    modules: Vec<&'static PluginModule>,
    api: Option<BoxedApi>,
    fetcher: Option<BoxedFetcher>,
    on_error: Option<ErrorObserver>,
}

impl BeeRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Falls back to default settings if the configuration cannot be
    /// loaded; use [`builder`](Self::builder) to get the error instead.
    pub fn new() -> Self {
        match ConfigLoader::new().with_current_dir().load() {
            Ok(config) => Self::from_config(&config),
            Err(e) => {
                let runtime = Self::from_config(&TgbeeConfig::default());
                warn!(error = %e, "Failed to load config, using defaults");
                runtime
            }
        }
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging.
    pub fn from_config(config: &TgbeeConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            mode = ?config.mode,
            log_level = %config.logging.level,
            plugin_dir = %config.plugins.dir.display(),
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            registry: HandlerRegistry::with_group_order(config.dispatch.group_order),
            modules: Vec::new(),
            api: None,
            fetcher: None,
            on_error: None,
        }
    }

    pub fn config(&self) -> &TgbeeConfig {
        &self.config
    }

    /// Registers a handler alongside the plugins.
    pub fn register(
        &mut self,
        registration: Registration,
    ) -> Result<HandlerHandle, InvalidHandlerError> {
        self.registry.register(registration)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Loads `module` even if no manifest names it.
    pub fn module(mut self, module: &'static PluginModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Uses `api` for outbound calls instead of the HTTP client.
    pub fn with_api(mut self, api: impl Api + 'static) -> Self {
        self.api = Some(Arc::new(api));
        self
    }

    /// Uses `fetcher` for polling instead of the HTTP client.
    pub fn with_fetcher(mut self, fetcher: impl UpdateFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Receives every handler failure instead of the default error log.
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&HandlerExecutionError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    // =========================================================================
    // Plugins
    // =========================================================================

    /// Loads the plugin directory and the explicitly added modules into the
    /// registry.
    ///
    /// Individual plugin failures are logged and reported; the call only
    /// fails when `plugins.required` is set and nothing loaded.
    pub async fn load_plugins(&mut self) -> RuntimeResult<LoadReport> {
        let settings = &self.config.plugins;
        let mut loader = PluginLoader::new()
            .dir(&settings.dir)
            .recursive(settings.recursive)
            .required(settings.required && self.modules.is_empty());

        let mut report = loader.load(&mut self.registry).await?;
        if !self.modules.is_empty() {
            let extra = loader.load_modules(&mut self.registry, &self.modules)?;
            report.loaded.extend(extra.loaded);
            report.failed.extend(extra.failed);
            report.skipped.extend(extra.skipped);
            report.handlers += extra.handlers;

            if settings.required && report.loaded.is_empty() {
                return Err(FrameworkError::NoPluginsLoaded {
                    failed: report.failed.len(),
                }
                .into());
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            handlers = self.registry.len(),
            "Plugins loaded"
        );
        Ok(report)
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(self) -> RuntimeResult<()> {
        info!("tgbee is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` resolves or ingestion ends on its own.
    ///
    /// On shutdown the webhook listener (if any) stops accepting first, then
    /// the engine drains in-flight handlers for up to the grace period.
    pub async fn run_until<F>(mut self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.load_plugins().await?;

        let api = self.resolve_api()?;
        let ingestion = self.ingestion(&api).await?;

        let mut builder = DispatchEngine::builder(api)
            .registry(std::mem::take(&mut self.registry))
            .config(self.config.dispatch.to_dispatch_config());
        if let Some(observer) = self.on_error.take() {
            builder = builder.on_error(move |err| observer(err));
        }
        let engine = builder.build();

        let Ingestion {
            source,
            #[cfg(feature = "http-server")]
            webhook,
        } = ingestion;
        let mut serving: JoinHandle<Result<(), EngineError>> = tokio::spawn({
            let engine = engine.clone();
            async move { engine.serve(source).await }
        });

        let finished = tokio::select! {
            _ = shutdown => None,
            joined = &mut serving => Some(joined),
        };

        let joined = match finished {
            Some(joined) => {
                warn!("Ingestion ended before shutdown was requested");
                #[cfg(feature = "http-server")]
                if let Some(listener) = webhook {
                    listener.shutdown().await;
                }
                joined
            }
            None => {
                info!("Shutting down");
                #[cfg(feature = "http-server")]
                if let Some(listener) = webhook {
                    listener.shutdown().await;
                }
                engine.stop().await;
                match serving.await {
                    // Shutdown arrived before the engine started serving.
                    Ok(Err(EngineError::Stopped)) => Ok(Ok(())),
                    joined => joined,
                }
            }
        };

        let result = match joined {
            Ok(result) => result.map_err(RuntimeError::from),
            Err(e) => {
                error!(error = %e, "Dispatch task failed");
                Err(EngineError::Stopped.into())
            }
        };
        info!("Runtime stopped");
        result
    }

    // ─── Collaborators ──────────────────────────────────────────────────────

    fn resolve_api(&mut self) -> RuntimeResult<BoxedApi> {
        if let Some(api) = self.api.take() {
            return Ok(api);
        }
        let (api, fetcher) = self.http_client()?;
        self.fetcher.get_or_insert(fetcher);
        Ok(api)
    }

    fn resolve_fetcher(&mut self) -> RuntimeResult<BoxedFetcher> {
        if let Some(fetcher) = self.fetcher.take() {
            return Ok(fetcher);
        }
        Ok(self.http_client()?.1)
    }

    /// One client serving as both the outbound API and the fetcher.
    #[cfg(feature = "http-client")]
    fn http_client(&self) -> RuntimeResult<(BoxedApi, BoxedFetcher)> {
        use tgbee_transport::BotApiClient;

        let bot = &self.config.bot;
        let token = bot
            .token
            .as_deref()
            .ok_or_else(|| ConfigError::missing_field("bot.token"))?;
        let client = BotApiClient::builder(token)
            .api_url(bot.api_url.clone())
            .request_timeout(Duration::from_secs(bot.request_timeout_secs))
            .build()?;
        tracing::debug!(api_url = %bot.api_url, "Created Bot API client");

        let client = Arc::new(client);
        Ok((client.clone(), client))
    }

    #[cfg(not(feature = "http-client"))]
    fn http_client(&self) -> RuntimeResult<(BoxedApi, BoxedFetcher)> {
        Err(RuntimeError::TransportUnavailable("http-client"))
    }

    // ─── Ingestion ──────────────────────────────────────────────────────────

    async fn ingestion(&mut self, api: &BoxedApi) -> RuntimeResult<Ingestion> {
        match self.config.mode {
            IngestMode::Polling => {
                let fetcher = self.resolve_fetcher()?;
                let settings = &self.config.polling;
                let mut source = PollingSource::new(fetcher).config(polling_config(settings)?);
                match &settings.watermark_path {
                    Some(path) => {
                        source = source.with_store(FileWatermarkStore::new(path));
                        info!(watermark = %path.display(), "Ingesting by long polling");
                    }
                    None => info!("Ingesting by long polling, watermark kept in memory"),
                }
                Ok(Ingestion {
                    source: Box::new(source),
                    #[cfg(feature = "http-server")]
                    webhook: None,
                })
            }
            IngestMode::Webhook => self.webhook_ingestion(api).await,
        }
    }

    #[cfg(feature = "http-server")]
    async fn webhook_ingestion(&self, api: &BoxedApi) -> RuntimeResult<Ingestion> {
        use tgbee_core::ApiExt;
        use tgbee_framework::PushSource;
        use tgbee_transport::{WebhookConfig, WebhookServer};

        let settings = &self.config.webhook;
        let port = settings
            .port
            .ok_or_else(|| ConfigError::missing_field("webhook.port"))?;
        let config = WebhookConfig {
            host: settings.host.clone(),
            port,
            path: settings.path.clone(),
            secret_token: settings.secret_token.clone(),
        };

        let (source, handle) = PushSource::new(self.config.dispatch.queue_capacity);
        let listener = WebhookServer::new(config, handle)
            .bind()
            .await
            .map_err(|source| RuntimeError::Bind {
                addr: format!("{}:{}", settings.host, port),
                source,
            })?;

        if let Some(url) = &settings.public_url {
            if let Err(e) = api.set_webhook(url, settings.secret_token.as_deref()).await {
                listener.shutdown().await;
                return Err(e.into());
            }
            info!(url = %url, "Registered webhook");
        }

        Ok(Ingestion {
            source: Box::new(source),
            webhook: Some(listener),
        })
    }

    #[cfg(not(feature = "http-server"))]
    async fn webhook_ingestion(&self, _api: &BoxedApi) -> RuntimeResult<Ingestion> {
        Err(RuntimeError::TransportUnavailable("http-server"))
    }
}

impl Default for BeeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// The source the engine serves, plus what has to be shut down with it.
struct Ingestion {
    source: Box<dyn UpdateSource>,
    #[cfg(feature = "http-server")]
    webhook: Option<tgbee_transport::WebhookListener>,
}

fn polling_config(settings: &PollingSettings) -> ConfigResult<PollingConfig> {
    Ok(PollingConfig {
        timeout: Duration::from_secs(settings.timeout_secs),
        limit: settings.limit,
        allowed_updates: parse_update_types("polling.allowed_updates", &settings.allowed_updates)?,
        backoff: settings.retry.to_backoff(),
        failure_threshold: settings.failure_threshold,
    })
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!(error = %e, "Failed to listen for Ctrl+C");
                        }
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`BeeRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Programmatic defaults; files and the environment override them.
    pub fn merge(mut self, config: TgbeeConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, then builds the runtime.
    pub fn build(self) -> ConfigResult<BeeRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(BeeRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
