//! Listener and HTTP transport settings.

use std::path::PathBuf;
use std::time::Duration;

/// Where the listener binds and how the transport guards each exchange.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// 0 lets the OS pick.
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Origins allowed by CORS; `"*"` allows any.
    pub cors_origins: Vec<String>,
    /// Backstop on a whole HTTP exchange. Keep it above the operation
    /// deadline, which already renders slow operations as failures.
    pub transport_timeout: Duration,
    /// Largest accepted form body, in bytes.
    pub body_limit_bytes: usize,
}

impl NetworkConfig {
    /// `host:port` as handed to the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL scheme clients use to reach the endpoint.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            cors_origins: vec!["*".to_string()],
            transport_timeout: Duration::from_secs(60),
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

/// PEM certificate chain and private key for the rustls acceptor.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// TLS is enabled only when both files are given.
    #[must_use]
    pub fn from_pair(cert_path: Option<PathBuf>, key_path: Option<PathBuf>) -> Option<Self> {
        Some(Self {
            cert_path: cert_path?,
            key_path: key_path?,
        })
    }
}
