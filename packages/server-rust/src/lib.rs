//! `DataService` server: discovers operation modules, catalogs their
//! operations, and dispatches HTTP requests to them, each call in its own
//! isolation boundary.

pub mod catalog;
pub mod config;
pub mod envelope;
pub mod loader;
pub mod network;
pub mod service;
pub mod telemetry;

pub use catalog::{build_catalog, CatalogHandle, DuplicateOperation, OperationCatalog};
pub use config::Cli;
pub use envelope::{OperationStatus, ResponseEnvelope};
pub use loader::{LinkedModuleHost, ModuleHost, ProcessModuleHost};
pub use network::{NetworkConfig, NetworkModule};
pub use service::{OperationService, ServerConfig};
