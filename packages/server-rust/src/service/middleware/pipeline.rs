//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::config::ServerConfig;
use crate::service::dispatcher::Dispatcher;

/// Concrete type of the composed dispatch pipeline.
pub type DispatchPipeline = MetricsService<LoadShedService<TimeoutService<Dispatcher>>>;

/// Build the dispatch pipeline by wrapping the `Dispatcher` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- record timing and outcome, including shed requests
/// 2. `LoadShedLayer` -- reject when overloaded before any module is loaded
/// 3. `TimeoutLayer` -- abandon operations past `operation_timeout_ms`,
///    releasing their load-shed permit and boundary
///
/// The pipeline is `Clone`; clones share the load-shedding semaphore.
#[must_use]
pub fn build_dispatch_pipeline(dispatcher: Dispatcher, config: &ServerConfig) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer::new(config.operation_timeout()))
        .service(dispatcher)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
