//! Transport-level middleware applied to every route.
//!
//! `Router::layer` wraps everything added before it, so layers are applied
//! innermost first. From the outside in, a request passes:
//!
//! 1. `SetRequestId` -- assigns a UUID `X-Request-Id` unless the client sent one
//! 2. `Trace` -- one span per HTTP request
//! 3. `Compression` -- gzip responses when the client accepts it
//! 4. `Cors` -- configured origins, any method (dispatch is verb-agnostic)
//! 5. `Timeout` -- 408 after `transport_timeout`, a backstop behind the
//!    operation deadline enforced in the dispatch pipeline
//! 6. `PropagateRequestId` -- echoes `X-Request-Id` on the response
//! 7. `DefaultBodyLimit` -- caps buffered bodies at `body_limit_bytes`; the
//!    dispatch handler turns an oversized form into a failure envelope
//!
//! Dispatch-level layers (metrics, load shedding, operation deadline) live in
//! [`crate::service::middleware`].

use axum::extract::DefaultBodyLimit;
use axum::Router;
use http::header::HeaderName;
use http::{HeaderValue, StatusCode};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// Header carrying the request id that also becomes the operation's request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router` in the transport middleware stack.
#[must_use]
pub fn with_http_layers<S>(router: Router<S>, config: &NetworkConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    router
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.transport_timeout,
        ))
        .layer(cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// `"*"` anywhere in the list allows every origin; otherwise unparsable
/// origins are dropped from the allowlist.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::any())
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}
