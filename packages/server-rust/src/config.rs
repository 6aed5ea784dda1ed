//! Command-line and environment configuration for the `dataservice` binary.
//!
//! Every flag can also be supplied through a `DATASERVICE_*` environment
//! variable; explicit flags win.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::network::{NetworkConfig, TlsConfig};
use crate::service::ServerConfig;
use crate::telemetry::{LogFormat, TelemetryConfig};

/// Command-line interface for the DataService server.
#[derive(Parser, Debug, Clone)]
#[command(name = "dataservice", version, about)]
pub struct Cli {
    /// Deployment directory scanned for modules.
    #[arg(long, env = "DATASERVICE_MODULE_DIR", default_value = "modules")]
    pub module_dir: PathBuf,
    /// File-name glob a module must match.
    #[arg(long, env = "DATASERVICE_MODULE_PATTERN", default_value = "*-module*")]
    pub module_pattern: String,
    /// Request parameter naming the operation.
    #[arg(long, env = "DATASERVICE_SELECTOR", default_value = "op")]
    pub selector: String,
    /// Prefix marking a request parameter as an extra.
    #[arg(long, env = "DATASERVICE_EXTRAS_PREFIX", default_value = "_")]
    pub extras_prefix: String,
    /// Appended to a colliding extras key until it is unique.
    #[arg(long, env = "DATASERVICE_COLLISION_SUFFIX", default_value = "_")]
    pub collision_suffix: String,
    /// Fold unprefixed request parameters into extras; `false` folds only
    /// prefixed ones.
    #[arg(
        long,
        env = "DATASERVICE_FOLD_UNPREFIXED",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub fold_unprefixed_params: bool,
    /// Upper bound on one module describe call, in milliseconds.
    #[arg(long, env = "DATASERVICE_DESCRIBE_TIMEOUT_MS", default_value_t = 10_000)]
    pub describe_timeout_ms: u64,
    /// Deadline for one dispatched operation, in milliseconds.
    #[arg(long, env = "DATASERVICE_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    pub operation_timeout_ms: u64,
    /// Concurrent operations allowed before requests are shed.
    #[arg(long, env = "DATASERVICE_MAX_CONCURRENT", default_value_t = 1000)]
    pub max_concurrent_operations: u32,
    /// Path of the dispatch endpoint.
    #[arg(long, env = "DATASERVICE_ENDPOINT_PATH", default_value = "/dataservice")]
    pub endpoint_path: String,

    /// Bind address.
    #[arg(long, env = "DATASERVICE_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Bind port; 0 picks an ephemeral port.
    #[arg(long, env = "DATASERVICE_PORT", default_value_t = 8080)]
    pub port: u16,
    /// PEM certificate chain; enables TLS together with `--tls-key`.
    #[arg(long, env = "DATASERVICE_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key.
    #[arg(long, env = "DATASERVICE_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
    /// Allowed CORS origins, comma separated.
    #[arg(
        long,
        env = "DATASERVICE_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "*"
    )]
    pub cors_origins: Vec<String>,
    /// Backstop on a whole HTTP exchange, in seconds.
    #[arg(long, env = "DATASERVICE_TRANSPORT_TIMEOUT_SECS", default_value_t = 60)]
    pub transport_timeout_secs: u64,
    /// Maximum request body size, in bytes.
    #[arg(long, env = "DATASERVICE_BODY_LIMIT", default_value_t = 2 * 1024 * 1024)]
    pub body_limit_bytes: usize,

    /// Tracing filter directive.
    #[arg(long, env = "DATASERVICE_LOG", default_value = "info")]
    pub log_filter: String,
    /// Log output format.
    #[arg(
        long,
        env = "DATASERVICE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Compact
    )]
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "DATASERVICE_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            module_dir: self.module_dir.clone(),
            module_pattern: self.module_pattern.clone(),
            selector: self.selector.clone(),
            extras_prefix: self.extras_prefix.clone(),
            collision_suffix: self.collision_suffix.clone(),
            fold_unprefixed_params: self.fold_unprefixed_params,
            describe_timeout_ms: self.describe_timeout_ms,
            operation_timeout_ms: self.operation_timeout_ms,
            max_concurrent_operations: self.max_concurrent_operations,
            endpoint_path: self.endpoint_path.clone(),
        }
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls: TlsConfig::from_pair(self.tls_cert.clone(), self.tls_key.clone()),
            cors_origins: self.cors_origins.clone(),
            transport_timeout: Duration::from_secs(self.transport_timeout_secs),
            body_limit_bytes: self.body_limit_bytes,
        }
    }

    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_filter: self.log_filter.clone(),
            log_format: self.log_format,
            metrics_addr: self.metrics_addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_component_defaults() {
        let cli = Cli::try_parse_from(["dataservice"]).unwrap();
        let server = cli.server_config();
        let defaults = ServerConfig::default();
        assert_eq!(server.module_pattern, defaults.module_pattern);
        assert_eq!(server.selector, defaults.selector);
        assert_eq!(server.endpoint_path, defaults.endpoint_path);
        assert!(server.fold_unprefixed_params);
        assert_eq!(server.operation_timeout(), defaults.operation_timeout());

        let network = cli.network_config();
        assert_eq!(network.port, 8080);
        assert!(network.tls.is_none());
        assert_eq!(network.cors_origins, vec!["*"]);
        assert_eq!(network.body_limit_bytes, NetworkConfig::default().body_limit_bytes);
        assert_eq!(network.transport_timeout, NetworkConfig::default().transport_timeout);

        assert_eq!(cli.telemetry_config(), TelemetryConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "dataservice",
            "--module-dir",
            "/srv/modules",
            "--selector",
            "action",
            "--fold-unprefixed-params",
            "false",
            "--operation-timeout-ms",
            "250",
            "--cors-origins",
            "https://a.example,https://b.example",
            "--log-format",
            "json",
            "--metrics-addr",
            "127.0.0.1:9100",
        ])
        .unwrap();

        assert_eq!(cli.server_config().module_dir, PathBuf::from("/srv/modules"));
        assert_eq!(cli.server_config().selector, "action");
        assert!(!cli.server_config().fold_unprefixed_params);
        assert_eq!(cli.server_config().operation_timeout_ms, 250);
        assert_eq!(cli.network_config().cors_origins.len(), 2);
        assert_eq!(cli.telemetry_config().log_format, LogFormat::Json);
        assert!(cli.telemetry_config().metrics_addr.is_some());
    }

    #[test]
    fn tls_needs_both_files() {
        assert!(Cli::try_parse_from(["dataservice", "--tls-cert", "c.pem"]).is_err());

        let cli =
            Cli::try_parse_from(["dataservice", "--tls-cert", "c.pem", "--tls-key", "k.pem"])
                .unwrap();
        let tls = cli.network_config().tls.unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("c.pem"));
    }
}
