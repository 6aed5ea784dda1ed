//! Wire protocol between the dispatcher and a deployed module.
//!
//! The exchange is a single JSON line in each direction over standard I/O.
//!
//! - `<module> describe` writes one [`ModuleManifest`] line to stdout.
//! - `<module> invoke <type-name>` reads one [`InvokeRequest`] line from stdin
//!   and writes one [`InvokeReply`] line to stdout.
//!
//! Module stderr is diagnostic only and is never parsed.

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::operation::{OperationFault, OperationOutput, Parameters};

/// Command that asks a module for its manifest.
pub const DESCRIBE_COMMAND: &str = "describe";

/// Command that asks a module to run one operation.
pub const INVOKE_COMMAND: &str = "invoke";

/// Everything a module exports, as reported by `describe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    /// Module name, usually the crate name.
    pub module: String,
    /// Module version.
    pub version: String,
    /// Exported operations in declaration order.
    pub operations: Vec<OperationDescriptor>,
}

impl ModuleManifest {
    /// `"<module> <version>"`, shown as the `assembly` of each operation.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{} {}", self.module, self.version)
    }
}

/// Static metadata of one exported operation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    /// Operation name used for dispatch.
    pub name: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Declared parameters.
    #[serde(default)]
    pub parameters: Parameters,
    /// Fully-qualified type name the module resolves on `invoke`.
    pub type_name: String,
}

/// Body of an `invoke` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    /// Type to instantiate. Must equal the command-line argument.
    pub type_name: String,
    /// Request the operation runs against.
    pub context: ExecutionContext,
}

/// Result of an `invoke` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum InvokeReply {
    /// The operation returned normally.
    Completed {
        /// Operation output.
        output: OperationOutput,
    },
    /// The operation raised a fault.
    Faulted {
        /// Fault raised by the operation.
        fault: OperationFault,
    },
    /// The module does not export the requested type.
    #[serde(rename_all = "camelCase")]
    UnknownType {
        /// Type that could not be resolved.
        type_name: String,
    },
}
