//! Dispatch framework.
//!
//! This module implements the per-request pipeline:
//!
//! 1. **Request** (`request`): `ExecutionContext` plus the selected operation name
//! 2. **Middleware** (`middleware`): Tower layers (metrics, load-shedding)
//! 3. **Dispatcher** (`dispatcher`): resolve, load, execute, render
//! 4. **Entry point** (`operation_service`): renders every error as a failure envelope

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod operation_service;
pub mod request;

// Re-export key types for convenient access.
pub use config::ServerConfig;
pub use dispatcher::{DispatchStage, Dispatcher};
pub use error::DispatchError;
pub use middleware::{build_dispatch_pipeline, DispatchPipeline};
pub use operation_service::OperationService;
pub use request::{DispatchRequest, DispatchResponse};
