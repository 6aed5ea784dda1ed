//! The single dispatch endpoint.
//!
//! Accepts any HTTP method. Query-string pairs come first, then the pairs of
//! an `application/x-www-form-urlencoded` body. The response is always 200
//! with a JSON body; failures, including a body over the size limit, are
//! carried inside the envelope.

use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use dataservice_core::{ExecutionContext, RequestParams};
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderMap, Uri};
use serde_json::Value;
use tracing::warn;
use url::form_urlencoded;
use uuid::Uuid;

use super::AppState;
use crate::network::REQUEST_ID_HEADER;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Dispatches one request through the operation service.
pub async fn dispatch_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Json<Value> {
    let _guard = state.shutdown.in_flight_guard();

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let endpoint_url = endpoint_url(&uri, &headers, state.config.scheme());

    let response = match body {
        Ok(body) => {
            let params = request_params(&uri, &headers, &body);
            let ctx = ExecutionContext::new(request_id, params, endpoint_url);
            state.operations.handle(ctx).await
        }
        Err(rejection) => {
            warn!(request_id = %request_id, error = %rejection, "request body rejected");
            let ctx = ExecutionContext::new(request_id, query_params(&uri), endpoint_url);
            state
                .operations
                .reject(&ctx, format!("request body rejected: {rejection}"))
        }
    };
    Json(response.body)
}

fn query_params(uri: &Uri) -> RequestParams {
    uri.query()
        .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn request_params(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> RequestParams {
    let mut params = query_params(uri);
    if is_form(headers) {
        params.extend(form_urlencoded::parse(body).into_owned());
    }
    params
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

/// Absolute URL of the endpoint as the client addressed it, without query.
fn endpoint_url(uri: &Uri, headers: &HeaderMap, scheme: &str) -> String {
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost");
    format!("{scheme}://{host}{}", uri.path())
}
