//! Request middleware
//!
//! - `request_context`: runs on every route; assigns the request id, logs the
//!   request and its latency, and echoes the id in `X-Request-ID`
//! - `require_deploy_token`: runs on authenticated routes only; verifies
//!   `X-Deploy-Token` before the handler sees the request

use std::sync::Arc;

use axum::{
    extract::{Extension, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::AppState;
use super::error::ApiError;
use crate::context::{REQUEST_ID_HEADER, RequestContext};

/// Header carrying the deploy token
pub const DEPLOY_TOKEN_HEADER: &str = "x-deploy-token";

/// Attaches a [`RequestContext`] to the request and the id to the response
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(request.headers());
    debug!(
        request_id = %ctx.id,
        started_at = %ctx.started_at,
        "Incoming request: {} {}",
        request.method(),
        request.uri().path()
    );

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&ctx.id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    debug!(
        request_id = %ctx.id,
        status = response.status().as_u16(),
        latency = %ctx.latency(),
        "Request complete"
    );

    response
}

/// Rejects the request with 401 unless it carries a valid deploy token
///
/// The scrypt derivation is CPU and memory heavy, so it runs on the blocking
/// pool instead of a runtime worker, at most `auth_permits` at a time.
pub async fn require_deploy_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(DEPLOY_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let permit = Arc::clone(&state.auth_permits)
        .acquire_owned()
        .await
        .map_err(|e| ApiError::InternalError(format!("Authentication limiter closed: {e}")))?;

    let config = Arc::clone(&state.config);
    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        config.authenticator.authenticate(token.as_deref())
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Authentication task failed: {e}")))?;

    if let Err(e) = result {
        warn!(request_id = %ctx.id, "Authentication failed: {}", e);
        return Err(e.into());
    }

    Ok(next.run(request).await)
}
