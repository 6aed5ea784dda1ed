//! HTTP transport: configuration, middleware, handlers, and lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use middleware::{with_http_layers, REQUEST_ID_HEADER};
pub use module::NetworkModule;
pub use shutdown::*;
