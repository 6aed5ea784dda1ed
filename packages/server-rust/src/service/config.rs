use std::path::PathBuf;
use std::time::Duration;

/// Server-level configuration for discovery and dispatch.
///
/// Controls where modules are found, how requests select an operation, how
/// request extras are merged, and the concurrency limit.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deployment directory scanned (recursively) for modules.
    pub module_dir: PathBuf,
    /// File-name glob a module must match.
    pub module_pattern: String,
    /// Request parameter naming the operation.
    pub selector: String,
    /// Prefix marking a request parameter as an extra.
    pub extras_prefix: String,
    /// Appended to an extras key until it no longer collides.
    pub collision_suffix: String,
    /// Also fold unprefixed request parameters (other than the selector)
    /// into extras.
    pub fold_unprefixed_params: bool,
    /// Upper bound on one `describe` call during discovery, in milliseconds.
    pub describe_timeout_ms: u64,
    /// Deadline for one dispatched operation, in milliseconds. A timed-out
    /// operation is dropped with its boundary and rendered as a failure.
    pub operation_timeout_ms: u64,
    /// Maximum number of concurrent operations before load shedding.
    pub max_concurrent_operations: u32,
    /// Path of the single dispatch route.
    pub endpoint_path: String,
}

impl ServerConfig {
    /// `describe_timeout_ms` as a `Duration`.
    #[must_use]
    pub fn describe_timeout(&self) -> Duration {
        Duration::from_millis(self.describe_timeout_ms)
    }

    /// `operation_timeout_ms` as a `Duration`.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            module_dir: PathBuf::from("modules"),
            module_pattern: "*-module*".to_string(),
            selector: "op".to_string(),
            extras_prefix: "_".to_string(),
            collision_suffix: "_".to_string(),
            fold_unprefixed_params: true,
            describe_timeout_ms: 10_000,
            operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
            endpoint_path: "/dataservice".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.module_pattern, "*-module*");
        assert_eq!(config.selector, "op");
        assert_eq!(config.extras_prefix, "_");
        assert_eq!(config.collision_suffix, "_");
        assert!(config.fold_unprefixed_params);
        assert_eq!(config.describe_timeout(), Duration::from_secs(10));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.endpoint_path, "/dataservice");
    }
}
