//! Concurrency cap for dispatches.
//!
//! A dispatch takes one permit before anything is resolved or loaded and
//! keeps it until its future completes or is dropped. With no permit free
//! the request fails at once with `DispatchError::Overloaded`; nothing waits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};
use tracing::warn;

use crate::service::error::DispatchError;
use crate::service::request::{DispatchRequest, DispatchResponse};

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Shares one permit pool between every service it wraps.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    permits: Arc<Semaphore>,
    limit: u32,
}

impl LoadShedLayer {
    /// Allows at most `limit` dispatches at once; 0 sheds everything.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit as usize)),
            limit,
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            permits: Arc::clone(&self.permits),
            limit: self.limit,
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    permits: Arc<Semaphore>,
    limit: u32,
}

impl<S> Service<DispatchRequest> for LoadShedService<S>
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
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            warn!(
                request_id = %request.ctx.request_id,
                operation = request.operation.as_deref().unwrap_or(""),
                limit = self.limit,
                "dispatch shed, concurrency limit reached"
            );
            return Box::pin(async { Err(DispatchError::Overloaded) });
        };

        let fut = self.inner.call(request);
        Box::pin(async move {
            let _permit = permit;
            fut.await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
