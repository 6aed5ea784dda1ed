use serde::{Deserialize, Serialize};

use crate::params::RequestParams;

/// Per-request context handed to an operation.
/// Owned by a single request and serialized to the module that executes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Correlation identifier, taken from `X-Request-Id` when present.
    pub request_id: String,
    /// Query-string parameters followed by form parameters.
    pub params: RequestParams,
    /// Absolute URL of the dispatcher endpoint, without the query string.
    pub endpoint_url: String,
}

impl ExecutionContext {
    /// Creates a context for the given request.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        params: RequestParams,
        endpoint_url: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            params,
            endpoint_url: endpoint_url.into(),
        }
    }

    /// Shorthand for `self.params.get(key)`.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }
}
