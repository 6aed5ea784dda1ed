use dataservice_core::OperationFault;

use crate::loader::{InvokeError, ModuleLoadError};

/// Everything that can go wrong between resolving a name and rendering.
///
/// All variants are rendered as a `Failed` envelope; none reach the
/// transport as an HTTP error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// No catalogued operation has the requested name.
    #[error("operation {name} was not found")]
    OperationNotFound {
        /// Name as requested.
        name: String,
    },
    /// The module or the operation type could not be loaded.
    #[error("{0}")]
    ModuleLoad(#[from] ModuleLoadError),
    /// The operation faulted, or its module failed while executing.
    #[error("{}", .0.diagnostic())]
    OperationExecutionFault(OperationFault),
    /// The operation outlived the dispatch deadline and was abandoned.
    #[error("operation {name} timed out after {timeout_ms} ms")]
    Timeout { name: String, timeout_ms: u64 },
    /// Too many operations are already running.
    #[error("server overloaded, try again later")]
    Overloaded,
}

impl DispatchError {
    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OperationNotFound { .. } => "not_found",
            Self::ModuleLoad(_) => "load_error",
            Self::OperationExecutionFault(_) => "fault",
            Self::Timeout { .. } => "timeout",
            Self::Overloaded => "overloaded",
        }
    }
}

impl From<InvokeError> for DispatchError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Load(load) => Self::ModuleLoad(load),
            InvokeError::Fault(fault) => Self::OperationExecutionFault(fault),
            InvokeError::Crashed {
                path,
                type_name,
                message,
            } => Self::OperationExecutionFault(
                OperationFault::new("ModuleCrashed", message)
                    .with_data("module", path.display().to_string())
                    .with_data("typeName", type_name),
            ),
        }
    }
}
