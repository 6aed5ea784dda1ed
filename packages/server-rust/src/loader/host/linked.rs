//! Module host for definitions compiled into the server.
//!
//! Each definition is bound to a deployment file path. The file has to exist
//! at every call, so deleting it retires the module exactly as it would for
//! a process module. Every call constructs a fresh operation instance inside
//! its own boundary and drops it before the boundary is released.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dataservice_core::{ExecutionContext, ModuleDefinition, ModuleManifest, OperationOutput};
use tracing::debug;

use super::{reply_into_result, require_module_file, ModuleHost};
use crate::loader::boundary::{BoundaryPurpose, BoundaryTracker};
use crate::loader::error::{InvokeError, ModuleLoadError};
use crate::loader::metadata::ModuleCoordinates;
use crate::service::DispatchStage;

/// Hosts in-process [`ModuleDefinition`]s keyed by deployment path.
#[derive(Debug, Clone, Default)]
pub struct LinkedModuleHost {
    modules: HashMap<PathBuf, Arc<ModuleDefinition>>,
    boundaries: BoundaryTracker,
}

impl LinkedModuleHost {
    /// Creates an empty host reporting to `boundaries`.
    #[must_use]
    pub fn new(boundaries: BoundaryTracker) -> Self {
        Self {
            modules: HashMap::new(),
            boundaries,
        }
    }

    /// Binds `definition` to the deployment file at `path`.
    #[must_use]
    pub fn bind(mut self, path: impl Into<PathBuf>, definition: ModuleDefinition) -> Self {
        self.modules.insert(path.into(), Arc::new(definition));
        self
    }

    fn definition(&self, path: &Path) -> Result<&ModuleDefinition, ModuleLoadError> {
        self.modules
            .get(path)
            .map(AsRef::as_ref)
            .ok_or_else(|| ModuleLoadError::Protocol {
                path: path.to_path_buf(),
                message: "no module definition is bound to this file".to_string(),
            })
    }
}

#[async_trait]
impl ModuleHost for LinkedModuleHost {
    async fn describe(&self, path: &Path) -> Result<ModuleManifest, ModuleLoadError> {
        require_module_file(path).await?;
        let definition = self.definition(path)?;
        let _boundary = self.boundaries.open(path, BoundaryPurpose::Describe);
        Ok(definition.manifest())
    }

    async fn invoke(
        &self,
        coordinates: &ModuleCoordinates,
        ctx: &ExecutionContext,
    ) -> Result<OperationOutput, InvokeError> {
        let path = coordinates.path.as_path();
        require_module_file(path).await?;
        let definition = self.definition(path)?;
        let boundary = self.boundaries.open(path, BoundaryPurpose::Invoke);

        debug!(
            request_id = %ctx.request_id,
            stage = DispatchStage::Executing.as_str(),
            boundary = boundary.id(),
            type_name = %coordinates.type_name,
            "executing linked operation"
        );
        let reply = definition.invoke(&coordinates.type_name, ctx.clone()).await;
        drop(boundary);

        reply_into_result(reply, coordinates)
    }

    fn boundaries(&self) -> &BoundaryTracker {
        &self.boundaries
    }
}

#[cfg(test)]
mod tests {
    use dataservice_core::{async_trait, Operation, OperationFault, RequestParams};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct Ping;

    #[async_trait]
    impl Operation for Ping {
        fn name(&self) -> &str {
            "Ping"
        }

        async fn execute(&self, ctx: &ExecutionContext) -> Result<OperationOutput, OperationFault> {
            Ok(OperationOutput::new(json!({ "pong": ctx.request_id })))
        }
    }

    fn setup() -> (TempDir, PathBuf, LinkedModuleHost) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ping-module");
        std::fs::write(&path, b"").unwrap();
        let host = LinkedModuleHost::default().bind(
            path.clone(),
            ModuleDefinition::new("ping-module", "0.1.0").export::<Ping>(),
        );
        (dir, path, host)
    }

    fn coords(path: &Path) -> ModuleCoordinates {
        ModuleCoordinates {
            path: path.to_path_buf(),
            type_name: std::any::type_name::<Ping>().to_string(),
            module_identity: "ping-module 0.1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn describe_and_invoke() {
        let (_dir, path, host) = setup();
        let manifest = host.describe(&path).await.unwrap();
        assert_eq!(manifest.operations[0].name, "Ping");

        let ctx = ExecutionContext::new("r-9", RequestParams::new(), "http://h/ds");
        let output = host.invoke(&coords(&path), &ctx).await.unwrap();
        assert_eq!(output.model, json!({ "pong": "r-9" }));
        assert_eq!(host.boundaries().open_count(), 0);
        assert_eq!(host.boundaries().opened_total(), 2);
    }

    #[tokio::test]
    async fn deleted_file_retires_module() {
        let (_dir, path, host) = setup();
        std::fs::remove_file(&path).unwrap();
        let err = host
            .invoke(&coords(&path), &ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Load(ModuleLoadError::MissingModule { .. })));
    }

    #[tokio::test]
    async fn unbound_file_is_protocol_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stray-module");
        std::fs::write(&path, b"").unwrap();
        let err = LinkedModuleHost::default().describe(&path).await.unwrap_err();
        assert!(matches!(err, ModuleLoadError::Protocol { .. }));
    }
}
