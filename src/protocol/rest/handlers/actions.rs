//! Action Handlers
//!
//! Endpoints for starting an action and checking it for timeout.

use std::sync::Arc;

use axum::{extract::Path, Extension, Json};

use crate::protocol::rest::dto::{ApiResponse, StartActionDto, StateDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

/// Start the action named by the session's current rule.
///
/// Start failures are recorded in state and reported as `ERROR`, not as an
/// HTTP error.
pub async fn start_action(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StartActionDto>>, RestError> {
    let status = handler.start_action(&id).await;
    Ok(Json(ApiResponse::success(StartActionDto {
        session_id: id,
        status,
    })))
}

/// Mark the action `TIMEOUT` if its deadline has passed
pub async fn check_timeout(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StateDto>>, RestError> {
    let attributes = handler.check_timeout(&id).await?;
    Ok(Json(ApiResponse::success(StateDto {
        session_id: id,
        attributes,
    })))
}
