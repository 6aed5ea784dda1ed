//! Module hosts: the seam between the loader and how modules are run.
//!
//! [`ProcessModuleHost`] treats every module as an executable and gives each
//! call its own child process. [`LinkedModuleHost`] runs
//! [`ModuleDefinition`](dataservice_core::ModuleDefinition)s compiled into the
//! server, bound to deployment file paths. Both open one
//! [`IsolationBoundary`](super::boundary::IsolationBoundary) per call.

mod linked;
mod process;

pub use linked::LinkedModuleHost;
pub use process::ProcessModuleHost;

use std::path::Path;

use async_trait::async_trait;
use dataservice_core::{ExecutionContext, InvokeReply, ModuleManifest, OperationOutput};

use super::boundary::BoundaryTracker;
use super::error::{InvokeError, ModuleLoadError};
use super::metadata::ModuleCoordinates;

/// Loads modules into isolation boundaries and talks to them.
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Loads the module at `path` and returns its manifest. The boundary is
    /// released before this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`ModuleLoadError`] if the module is missing, cannot be
    /// started, or does not answer with a valid manifest.
    async fn describe(&self, path: &Path) -> Result<ModuleManifest, ModuleLoadError>;

    /// Loads the module named by `coordinates` into a fresh boundary,
    /// instantiates the type and runs it against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Load`] when the module or type cannot be loaded,
    /// [`InvokeError::Fault`] when the operation faults, and
    /// [`InvokeError::Crashed`] when the module fails mid-execution.
    async fn invoke(
        &self,
        coordinates: &ModuleCoordinates,
        ctx: &ExecutionContext,
    ) -> Result<OperationOutput, InvokeError>;

    /// Tracker counting this host's open boundaries.
    fn boundaries(&self) -> &BoundaryTracker;
}

/// Maps a module's reply onto the host result.
fn reply_into_result(
    reply: InvokeReply,
    coordinates: &ModuleCoordinates,
) -> Result<OperationOutput, InvokeError> {
    match reply {
        InvokeReply::Completed { output } => Ok(output),
        InvokeReply::Faulted { fault } => Err(InvokeError::Fault(fault)),
        InvokeReply::UnknownType { type_name } => Err(InvokeError::Load(
            ModuleLoadError::UnresolvedType {
                path: coordinates.path.clone(),
                type_name,
            },
        )),
    }
}

/// Fails with `MissingModule` unless `path` is an existing file.
async fn require_module_file(path: &Path) -> Result<(), ModuleLoadError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(ModuleLoadError::MissingModule {
            path: path.to_path_buf(),
        }),
    }
}
