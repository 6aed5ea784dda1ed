//! Module loading: discovery, isolation boundaries and module hosts.
//!
//! - [`discovery`]: scans the deployment directory for module files
//! - [`host`]: the [`ModuleHost`] seam and its process and linked hosts
//! - [`boundary`]: per-call isolation scopes and their tracker
//! - [`metadata`]: what discovery records about each operation

pub mod boundary;
pub mod discovery;
pub mod error;
pub mod host;
pub mod metadata;
pub mod pattern;

pub use boundary::{BoundaryPurpose, BoundaryTracker, IsolationBoundary};
pub use discovery::discover;
pub use error::{DiscoveryError, InvokeError, ModuleLoadError};
pub use host::{LinkedModuleHost, ModuleHost, ProcessModuleHost};
pub use metadata::{ModuleCoordinates, OperationMetadata};
pub use pattern::GlobPattern;
