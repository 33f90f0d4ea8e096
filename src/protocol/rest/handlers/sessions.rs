//! Session Handlers
//!
//! Endpoints for running turns, reading or updating session state and
//! handling keypad (DTMF) entry.

use std::sync::Arc;

use axum::{extract::Path, Extension, Json};

use crate::engine::{TurnInput, TurnOutcome};
use crate::protocol::rest::dto::{
    ApiResponse, DtmfInputRequest, DtmfMenuRequest, InferRequest, SetStateRequest, StateDto,
};
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

/// Run one inference turn for a session
pub async fn infer(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
    Json(request): Json<InferRequest>,
) -> Result<Json<ApiResponse<TurnOutcome>>, RestError> {
    let input = TurnInput {
        session_id: id,
        trigger: request.trigger,
        caller: request.caller,
        parameters: request.parameters,
    };

    let outcome = handler.infer(&input).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// String projection of a session's state
pub async fn get_state(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StateDto>>, RestError> {
    let attributes = handler.load_state(&id).await?;
    Ok(Json(ApiResponse::success(StateDto {
        session_id: id,
        attributes,
    })))
}

/// Apply `keyN`/`valueN` updates to a session
pub async fn set_state(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
    Json(request): Json<SetStateRequest>,
) -> Result<Json<ApiResponse<StateDto>>, RestError> {
    let attributes = handler.set_state(&id, &request).await?;
    Ok(Json(ApiResponse::success(StateDto {
        session_id: id,
        attributes,
    })))
}

/// Route a keypad menu selection to the configured rule set
pub async fn dtmf_menu(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
    Json(request): Json<DtmfMenuRequest>,
) -> Result<Json<ApiResponse<StateDto>>, RestError> {
    let attributes = handler.dtmf_menu(&id, &request.selected_option).await?;
    Ok(Json(ApiResponse::success(StateDto {
        session_id: id,
        attributes,
    })))
}

/// Validate and capture keypad input for the current rule
pub async fn dtmf_input(
    Extension(handler): Extension<Arc<Handler>>,
    Path(id): Path<String>,
    Json(request): Json<DtmfInputRequest>,
) -> Result<Json<ApiResponse<StateDto>>, RestError> {
    let attributes = handler.dtmf_input(&id, request.input.as_deref()).await?;
    Ok(Json(ApiResponse::success(StateDto {
        session_id: id,
        attributes,
    })))
}
