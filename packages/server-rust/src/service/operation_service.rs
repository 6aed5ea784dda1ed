//! Entry point used by the transport: one call per HTTP request.

use std::sync::Arc;

use dataservice_core::{ExecutionContext, RequestParams};
use tower::ServiceExt;
use tracing::info;

use super::config::ServerConfig;
use super::dispatcher::Dispatcher;
use super::middleware::{build_dispatch_pipeline, DispatchPipeline};
use super::request::{DispatchRequest, DispatchResponse};
use crate::catalog::{build_catalog, CatalogHandle, OperationCatalog};
use crate::envelope::{render_failure, ExtrasRules, OperationStatus};
use crate::loader::{DiscoveryError, ModuleHost};

/// Owns the catalog, the module host and the dispatch pipeline.
///
/// [`handle`](Self::handle) never fails: every error is rendered as a
/// `Failed` envelope with request extras merged.
pub struct OperationService {
    pipeline: DispatchPipeline,
    catalog: Arc<CatalogHandle>,
    host: Arc<dyn ModuleHost>,
    config: Arc<ServerConfig>,
    rules: ExtrasRules,
}

impl OperationService {
    /// Wires a service around an already built catalog.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        catalog: OperationCatalog,
        host: Arc<dyn ModuleHost>,
    ) -> Self {
        let rules = ExtrasRules {
            prefix: config.extras_prefix.clone(),
            collision_suffix: config.collision_suffix.clone(),
            fold_unprefixed: config.fold_unprefixed_params,
            selector: config.selector.clone(),
        };
        let catalog = Arc::new(CatalogHandle::new(catalog));
        let dispatcher = Dispatcher::new(Arc::clone(&catalog), Arc::clone(&host), rules.clone());
        let pipeline = build_dispatch_pipeline(dispatcher, &config);

        Self {
            pipeline,
            catalog,
            host,
            config: Arc::new(config),
            rules,
        }
    }

    /// Discovers modules and builds the initial catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the deployment directory cannot be
    /// scanned; the server must not start in that case.
    pub async fn start(
        config: ServerConfig,
        host: Arc<dyn ModuleHost>,
    ) -> Result<Self, DiscoveryError> {
        let catalog = build_catalog(
            &config.module_dir,
            &config.module_pattern,
            host.as_ref(),
            config.describe_timeout(),
        )
        .await?;
        Ok(Self::new(config, catalog, host))
    }

    /// Dispatches one request and renders the result.
    pub async fn handle(&self, ctx: ExecutionContext) -> DispatchResponse {
        let request = DispatchRequest::new(ctx, &self.config.selector);
        let params = request.params().clone();

        match self.pipeline.clone().oneshot(request).await {
            Ok(response) => response,
            Err(err) => self.failure(err.to_string(), &params),
        }
    }

    /// Renders a request the transport could not hand to the pipeline, such
    /// as one whose body was over the size limit.
    #[must_use]
    pub fn reject(&self, ctx: &ExecutionContext, message: impl Into<String>) -> DispatchResponse {
        self.failure(message, &ctx.params)
    }

    fn failure(&self, message: impl Into<String>, params: &RequestParams) -> DispatchResponse {
        DispatchResponse {
            body: render_failure(message, params, &self.rules),
            status: OperationStatus::Failed,
        }
    }

    /// Rebuilds the catalog from the deployment directory.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] and keeps the current catalog on failure.
    pub async fn reload(&self) -> Result<usize, DiscoveryError> {
        let size = self
            .catalog
            .reload(
                &self.config.module_dir,
                &self.config.module_pattern,
                self.host.as_ref(),
                self.config.describe_timeout(),
            )
            .await?;
        info!(operations = size, "operation catalog reloaded");
        Ok(size)
    }

    /// Snapshot of the current catalog.
    #[must_use]
    pub fn catalog(&self) -> Arc<OperationCatalog> {
        self.catalog.load()
    }

    /// Number of isolation boundaries currently open.
    #[must_use]
    pub fn open_boundaries(&self) -> u64 {
        self.host.boundaries().open_count()
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
