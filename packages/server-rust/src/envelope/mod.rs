//! The uniform JSON response envelope.
//!
//! - [`merge`]: folding request parameters into extras
//! - [`listing`]: the catalog listing model

pub mod listing;
pub mod merge;

pub use listing::listing_model;
pub use merge::{merge_request_extras, ExtrasRules};

use dataservice_core::{Extras, OperationOutput, RenderMode, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Envelope field names an operation may not set through `fields`.
pub const RESERVED_FIELDS: [&str; 3] = ["model", "serviceStatus", "extras"];

/// Outcome reported in `serviceStatus.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// The operation completed.
    Succeeded,
    /// Resolution, loading or execution failed.
    Failed,
}

impl OperationStatus {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// The `serviceStatus` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Outcome.
    pub status: OperationStatus,
    /// Empty on success unless the operation set one; the error text on failure.
    pub message: String,
}

/// Response body for a dispatched operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Operation payload; `null` on failure.
    pub model: Value,
    /// Outcome and message.
    pub service_status: ServiceStatus,
    /// Operation extras followed by request extras.
    pub extras: Extras,
    /// Additional top-level fields set by the operation.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Wraps a successful output. Reserved field names in `output.fields`
    /// are dropped.
    #[must_use]
    pub fn succeeded(output: OperationOutput) -> Self {
        let mut fields = output.fields;
        for reserved in RESERVED_FIELDS {
            if fields.remove(reserved).is_some() {
                warn!(field = reserved, "operation set a reserved envelope field; dropped");
            }
        }
        Self {
            model: output.model,
            service_status: ServiceStatus {
                status: OperationStatus::Succeeded,
                message: output.message,
            },
            extras: output.extras,
            fields,
        }
    }

    /// Failure envelope carrying `message`.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            model: Value::Null,
            service_status: ServiceStatus {
                status: OperationStatus::Failed,
                message: message.into(),
            },
            extras: Extras::new(),
            fields: Map::new(),
        }
    }

    /// Folds request extras in, per `rules`.
    #[must_use]
    pub fn with_request_extras(mut self, params: &RequestParams, rules: &ExtrasRules) -> Self {
        merge_request_extras(&mut self.extras, params, rules);
        self
    }

    /// Serializes the envelope into a JSON value.
    #[must_use]
    pub fn into_json(self) -> Value {
        // Every field is already a JSON value or a plain string.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Renders a successful output: the bare model for model-only outputs,
/// otherwise the full envelope with request extras merged.
#[must_use]
pub fn render_output(
    output: OperationOutput,
    params: &RequestParams,
    rules: &ExtrasRules,
) -> Value {
    match output.render {
        RenderMode::ModelOnly => output.model,
        RenderMode::Envelope => ResponseEnvelope::succeeded(output)
            .with_request_extras(params, rules)
            .into_json(),
    }
}

/// Renders a failure: `null` model, `Failed` status, request extras merged.
#[must_use]
pub fn render_failure(
    message: impl Into<String>,
    params: &RequestParams,
    rules: &ExtrasRules,
) -> Value {
    ResponseEnvelope::failed(message)
        .with_request_extras(params, rules)
        .into_json()
}
