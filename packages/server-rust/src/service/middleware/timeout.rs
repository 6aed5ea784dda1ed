//! Operation deadline middleware.
//!
//! Fails a dispatch that outlives its deadline with `DispatchError::Timeout`.
//! The inner future is dropped, which closes the dispatch's isolation
//! boundary and kills a module process still running.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};
use tracing::warn;

use crate::service::error::DispatchError;
use crate::service::request::{DispatchRequest, DispatchResponse};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Applies one deadline to every dispatch.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    deadline: Duration,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            deadline: self.deadline,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    deadline: Duration,
}

impl<S> Service<DispatchRequest> for TimeoutService<S>
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
        let deadline = self.deadline;
        let request_id = request.ctx.request_id.clone();
        let operation = request.operation.clone().unwrap_or_default();
        let fut = self.inner.call(request);

        Box::pin(async move {
            if let Ok(result) = tokio::time::timeout(deadline, fut).await {
                return result;
            }
            let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
            warn!(
                request_id = %request_id,
                operation = %operation,
                timeout_ms,
                "operation deadline exceeded"
            );
            Err(DispatchError::Timeout {
                name: operation,
                timeout_ms,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
