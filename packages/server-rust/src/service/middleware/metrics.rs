//! Metrics middleware for dispatches.
//!
//! Wraps each dispatch in a `tracing` span and records
//! `dataservice_operations_total{outcome}` and
//! `dataservice_operation_duration_seconds{outcome}` through the `metrics`
//! facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::error::DispatchError;
use crate::service::request::{outcome_label, DispatchRequest, DispatchResponse};

/// Counter of finished dispatches, labelled by `outcome`.
pub const OPERATIONS_TOTAL: &str = "dataservice_operations_total";

/// Histogram of dispatch durations in seconds, labelled by `outcome`.
pub const OPERATION_DURATION_SECONDS: &str = "dataservice_operation_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatches with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records dispatch duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<DispatchRequest> for MetricsService<S>
where
    S: Service<DispatchRequest, Response = DispatchResponse, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = DispatchResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: DispatchRequest) -> Self::Future {
        let request_id = request.ctx.request_id.clone();
        let operation = request.operation.clone().unwrap_or_default();

        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            operation = %operation,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = outcome_label(&result);

                let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                ::metrics::counter!(OPERATIONS_TOTAL, "outcome" => outcome).increment(1);
                ::metrics::histogram!(OPERATION_DURATION_SECONDS, "outcome" => outcome)
                    .record(elapsed.as_secs_f64());

                match &result {
                    Err(err) => tracing::info!(
                        request_id = %request_id,
                        operation = %operation,
                        duration_ms,
                        outcome,
                        error = %err,
                        "dispatch complete"
                    ),
                    Ok(_) => tracing::info!(
                        request_id = %request_id,
                        operation = %operation,
                        duration_ms,
                        outcome,
                        "dispatch complete"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use dataservice_core::ExecutionContext;
    use tower::ServiceExt;

    use super::*;

    /// Immediately-completing service that fails for operation `Fail`.
    struct ImmediateService;

    impl Service<DispatchRequest> for ImmediateService {
        type Response = DispatchResponse;
        type Error = DispatchError;
        type Future =
            Pin<Box<dyn Future<Output = Result<DispatchResponse, DispatchError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: DispatchRequest) -> Self::Future {
            Box::pin(async move {
                match request.operation.as_deref() {
                    Some("Fail") => Err(DispatchError::OperationNotFound {
                        name: "Fail".to_string(),
                    }),
                    _ => Ok(DispatchResponse::succeeded(serde_json::json!({ "ok": true }))),
                }
            })
        }
    }

    fn request(op: &str) -> DispatchRequest {
        let ctx = ExecutionContext::new("r", [("op", op)].into_iter().collect(), "http://h/ds");
        DispatchRequest::new(ctx, "op")
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_response() {
        let svc = MetricsLayer.layer(ImmediateService);
        let resp = svc.oneshot(request("Echo")).await.unwrap();
        assert_eq!(resp.body["ok"], true);
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_error() {
        let svc = MetricsLayer.layer(ImmediateService);
        let err = svc.oneshot(request("Fail")).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
