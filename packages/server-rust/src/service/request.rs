use dataservice_core::{ExecutionContext, RequestParams};

use super::error::DispatchError;
use crate::envelope::OperationStatus;

/// One request flowing through the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Context handed to the operation.
    pub ctx: ExecutionContext,
    /// Selected operation name; `None` when the selector is absent or blank.
    pub operation: Option<String>,
}

impl DispatchRequest {
    /// Builds a request, reading the operation name from the `selector`
    /// parameter.
    #[must_use]
    pub fn new(ctx: ExecutionContext, selector: &str) -> Self {
        let operation = ctx
            .params
            .get_non_blank(selector)
            .map(|name| name.trim().to_string());
        Self { ctx, operation }
    }

    /// Request parameters.
    #[must_use]
    pub fn params(&self) -> &RequestParams {
        &self.ctx.params
    }
}

/// Rendered result of a dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    /// JSON body: envelope, bare model or listing.
    pub body: serde_json::Value,
    /// Outcome recorded for logs and metrics.
    pub status: OperationStatus,
}

impl DispatchResponse {
    /// A succeeded response with the given body.
    #[must_use]
    pub fn succeeded(body: serde_json::Value) -> Self {
        Self {
            body,
            status: OperationStatus::Succeeded,
        }
    }
}

/// Outcome label for a pipeline result.
#[must_use]
pub fn outcome_label(result: &Result<DispatchResponse, DispatchError>) -> &'static str {
    match result {
        Ok(response) => response.status.as_str(),
        Err(err) => err.kind(),
    }
}
