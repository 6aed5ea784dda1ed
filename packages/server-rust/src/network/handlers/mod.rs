//! HTTP handlers and the state they share.

pub mod dispatch;
pub mod health;

pub use dispatch::dispatch_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::service::OperationService;

/// Shared application state passed to handlers via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Catalog, module host and dispatch pipeline.
    pub operations: Arc<OperationService>,
    /// Network configuration; the dispatch handler reads the TLS flag.
    pub config: Arc<NetworkConfig>,
    /// Process start time, for uptime.
    pub start_time: Instant,
}
