//! Redeploy API Handler
//!
//! Validates the request synchronously, then hands the workflow to a
//! detached task and acknowledges immediately. The caller never observes the
//! outcome of the redeploy over this connection.

use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
};
use redeployer_core::domain::request::{RedeploymentRequest, ResponseMessage};
use tracing::{debug, info, warn};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::context::RequestContext;

/// POST /redeploy
/// Trigger a redeployment of `target` with `image`
pub async fn trigger_redeployment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<RedeploymentRequest>, JsonRejection>,
) -> ApiResult<Json<ResponseMessage>> {
    debug!(request_id = %ctx.id, "Redeployment requested");

    let Json(req) = payload.map_err(|e| {
        warn!(request_id = %ctx.id, "Failed to parse request body: {}", e);
        ApiError::BadRequest("Bad request".to_string())
    })?;

    let target = state
        .config
        .targets
        .validate(&req.target, &req.image)?
        .clone();

    info!(
        request_id = %ctx.id,
        target = %target.id,
        image = %req.image,
        "Redeployment triggered"
    );

    // Detached: the handle is dropped and the workflow runs on its own.
    drop(state.redeployer.trigger(ctx, target, req.image));

    Ok(Json(ResponseMessage::new("Redeployment triggered")))
}
