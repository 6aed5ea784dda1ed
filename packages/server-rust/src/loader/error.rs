//! Errors raised while discovering and loading modules.
//!
//! I/O errors are wrapped in `Arc` so the enums stay `Clone` and small.

use std::path::PathBuf;
use std::sync::Arc;

use dataservice_core::OperationFault;
use thiserror::Error;

/// Failure to scan the deployment directory. Fatal at startup.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// The deployment directory does not exist.
    #[error("module directory {} does not exist", path.display())]
    MissingDirectory {
        /// Configured directory.
        path: PathBuf,
    },

    /// The deployment path exists but is not a directory.
    #[error("module path {} is not a directory", path.display())]
    NotADirectory {
        /// Configured path.
        path: PathBuf,
    },

    /// The deployment directory could not be read.
    #[error("failed to read module directory {}: {source}", path.display())]
    Unreadable {
        /// Configured directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The module file-name pattern is unusable.
    #[error("invalid module pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// Pattern as configured.
        pattern: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Failure to load a module or resolve a type inside it.
#[derive(Debug, Clone, Error)]
pub enum ModuleLoadError {
    /// The module file is gone (deleted after discovery, or never deployed).
    #[error("module file {} does not exist", path.display())]
    MissingModule {
        /// Module path.
        path: PathBuf,
    },

    /// The module process could not be started.
    #[error("module {} failed to start: {source}", path.display())]
    Spawn {
        /// Module path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The module does not export the requested type.
    #[error("module {} does not export type {type_name}", path.display())]
    UnresolvedType {
        /// Module path.
        path: PathBuf,
        /// Fully-qualified type name that was requested.
        type_name: String,
    },

    /// The module did not answer `describe` in time.
    #[error("module {} did not describe itself within {timeout_ms}ms", path.display())]
    Timeout {
        /// Module path.
        path: PathBuf,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The module exited unsuccessfully while describing itself.
    #[error("module {} exited with {status} during describe: {stderr}", path.display())]
    Exited {
        /// Module path.
        path: PathBuf,
        /// Exit status as reported by the OS.
        status: String,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// The module wrote something that does not follow the wire protocol.
    #[error("module {} broke the protocol: {message}", path.display())]
    Protocol {
        /// Module path.
        path: PathBuf,
        /// Description of the violation.
        message: String,
    },
}

/// Failure of a single `invoke` call.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The module or the type could not be loaded.
    #[error(transparent)]
    Load(#[from] ModuleLoadError),

    /// The operation ran and raised a fault.
    #[error(transparent)]
    Fault(#[from] OperationFault),

    /// The module process failed while executing (crash, bad reply).
    #[error("module {} failed while executing {type_name}: {message}", path.display())]
    Crashed {
        /// Module path.
        path: PathBuf,
        /// Type that was executing.
        type_name: String,
        /// Exit status, stderr or parse failure.
        message: String,
    },
}
