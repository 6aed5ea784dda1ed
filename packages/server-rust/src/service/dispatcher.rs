//! The dispatcher: resolve, load, execute, render.
//!
//! Per-request control flow is
//! `Idle -> Resolving -> Loading -> Executing -> Rendering -> Done`, with
//! `Failed` reachable from any stage. Loading and executing happen inside the
//! module host, in a boundary opened for this request alone; the host traces
//! the `Executing` transition once the module is loaded. The boundary is gone
//! by the time [`Dispatcher::dispatch`] returns or is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::debug;

use super::error::DispatchError;
use super::request::{DispatchRequest, DispatchResponse};
use crate::catalog::CatalogHandle;
use crate::envelope::{listing_model, render_output, ExtrasRules};
use crate::loader::ModuleHost;

/// Stage of one dispatch, as traced at `debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    /// Accepted, nothing resolved yet.
    Idle,
    /// Reading the selector and looking the name up.
    Resolving,
    /// Loading the module into a fresh boundary.
    Loading,
    /// Running the operation inside its boundary.
    Executing,
    /// Rendering the envelope, bare model or listing.
    Rendering,
    /// Response ready.
    Done,
    /// Dispatch failed; the error will be rendered as a failure envelope.
    Failed,
}

impl DispatchStage {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Loading => "loading",
            Self::Executing => "executing",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

fn enter(stage: DispatchStage, request_id: &str) {
    debug!(request_id, stage = stage.as_str(), "dispatch stage");
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Innermost service of the dispatch pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<CatalogHandle>,
    host: Arc<dyn ModuleHost>,
    rules: Arc<ExtrasRules>,
}

impl Dispatcher {
    /// Creates a dispatcher over a shared catalog and module host.
    #[must_use]
    pub fn new(
        catalog: Arc<CatalogHandle>,
        host: Arc<dyn ModuleHost>,
        rules: ExtrasRules,
    ) -> Self {
        Self {
            catalog,
            host,
            rules: Arc::new(rules),
        }
    }

    /// Runs one request to completion.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the name is unknown, the module cannot
    /// be loaded, or the operation faults.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
    ) -> Result<DispatchResponse, DispatchError> {
        let request_id = request.ctx.request_id.as_str();
        enter(DispatchStage::Idle, request_id);
        let catalog = self.catalog.load();

        enter(DispatchStage::Resolving, request_id);
        let Some(name) = request.operation.as_deref() else {
            enter(DispatchStage::Rendering, request_id);
            let body = listing_model(&catalog, &request.ctx.endpoint_url, &self.rules.selector);
            enter(DispatchStage::Done, request_id);
            return Ok(DispatchResponse::succeeded(body));
        };

        let Some(metadata) = catalog.lookup(name) else {
            enter(DispatchStage::Failed, request_id);
            return Err(DispatchError::OperationNotFound {
                name: name.to_string(),
            });
        };

        enter(DispatchStage::Loading, request_id);
        match self.host.invoke(&metadata.coordinates, &request.ctx).await {
            Ok(output) => {
                enter(DispatchStage::Rendering, request_id);
                let body = render_output(output, request.params(), &self.rules);
                enter(DispatchStage::Done, request_id);
                Ok(DispatchResponse::succeeded(body))
            }
            Err(err) => {
                enter(DispatchStage::Failed, request_id);
                Err(err.into())
            }
        }
    }
}

impl Service<DispatchRequest> for Dispatcher {
    type Response = DispatchResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: DispatchRequest) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.dispatch(request).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use dataservice_core::{
        async_trait, ExecutionContext, ModuleDefinition, Operation, OperationFault,
        OperationOutput,
    };
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::catalog::build_catalog;
    use crate::envelope::OperationStatus;
    use crate::loader::{InvokeError, LinkedModuleHost, ModuleLoadError};

    #[derive(Default)]
    struct Paged;

    #[async_trait]
    impl Operation for Paged {
        fn name(&self) -> &str {
            "GetPaged"
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<OperationOutput, OperationFault> {
            Ok(OperationOutput::new(json!({ "items": [] })).with_extra("PageIndex", 2))
        }
    }

    #[derive(Default)]
    struct Faulty;

    #[async_trait]
    impl Operation for Faulty {
        fn name(&self) -> &str {
            "Faulty"
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<OperationOutput, OperationFault> {
            Err(OperationFault::failed("bad things"))
        }
    }

    async fn setup() -> (TempDir, PathBuf, Dispatcher) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample-module");
        std::fs::write(&path, b"").unwrap();
        let host = LinkedModuleHost::default().bind(
            path.clone(),
            ModuleDefinition::new("sample-module", "0.1.0")
                .export::<Paged>()
                .export::<Faulty>(),
        );
        let catalog = build_catalog(dir.path(), "*-module", &host, Duration::from_secs(1))
            .await
            .unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(CatalogHandle::new(catalog)),
            Arc::new(host),
            ExtrasRules::default(),
        );
        (dir, path, dispatcher)
    }

    fn request(pairs: &[(&str, &str)]) -> DispatchRequest {
        let params = pairs.iter().copied().collect();
        let ctx = ExecutionContext::new("req", params, "http://h/dataservice");
        DispatchRequest::new(ctx, "op")
    }

    #[tokio::test]
    async fn dispatches_and_merges_extras() {
        let (_dir, _path, dispatcher) = setup().await;
        let response = dispatcher
            .oneshot(request(&[("op", "getpaged"), ("_Foo", "bar")]))
            .await
            .unwrap();
        assert_eq!(response.status, OperationStatus::Succeeded);
        assert_eq!(response.body["extras"], json!({ "PageIndex": 2, "Foo": "bar" }));
        assert_eq!(response.body["serviceStatus"]["status"], "Succeeded");
    }

    #[tokio::test]
    async fn no_selector_lists_catalog() {
        let (_dir, _path, dispatcher) = setup().await;
        let response = dispatcher.dispatch(request(&[("_Foo", "bar")])).await.unwrap();
        let entries = response.body["operations"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["operationUrl"], "http://h/dataservice?op=GetPaged");
        assert!(response.body.get("extras").is_none());
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let (_dir, _path, dispatcher) = setup().await;
        let err = dispatcher
            .dispatch(request(&[("op", "DoesNotExist")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::OperationNotFound { ref name } if name == "DoesNotExist"
        ));
    }

    #[tokio::test]
    async fn fault_is_execution_fault() {
        let (_dir, _path, dispatcher) = setup().await;
        let err = dispatcher.dispatch(request(&[("op", "Faulty")])).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::OperationExecutionFault(ref fault) if fault.message == "bad things"
        ));
    }

    #[tokio::test]
    async fn deleted_module_is_load_error() {
        let (_dir, path, dispatcher) = setup().await;
        std::fs::remove_file(&path).unwrap();
        let err = dispatcher.dispatch(request(&[("op", "GetPaged")])).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ModuleLoad(ModuleLoadError::MissingModule { .. })
        ));
        // Still usable afterwards.
        std::fs::write(&path, b"").unwrap();
        assert!(dispatcher.dispatch(request(&[("op", "GetPaged")])).await.is_ok());
    }

    #[test]
    fn invoke_error_conversion_is_used() {
        let err: DispatchError = InvokeError::Fault(OperationFault::failed("x")).into();
        assert_eq!(err.kind(), "fault");
        assert_eq!(DispatchStage::Loading.as_str(), "loading");
        assert_eq!(DispatchStage::Idle.as_str(), "idle");
        assert_eq!(DispatchStage::Executing.as_str(), "executing");
    }
}
