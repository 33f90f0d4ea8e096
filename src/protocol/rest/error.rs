//! REST API Error Types
//!
//! Provides error types and conversions for the REST API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::EngineError;
use crate::protocol::rest::dto::{ApiErrorDto, ApiResponse};
use crate::store::StoreError;

/// REST API error that can be returned from handlers
#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub error: ApiErrorDto,
}

impl RestError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiErrorDto {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::failure(self.error))).into_response()
    }
}

// Conversions from domain errors
impl From<EngineError> for RestError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Configuration(_)
            | EngineError::LookupFailed { .. }
            | EngineError::Template(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::RuleSetNotFound(_) | EngineError::RuleNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::Exhausted { .. } | EngineError::NoRuleActivated(_) => StatusCode::CONFLICT,
            EngineError::MissingParameter(_)
            | EngineError::Store(StoreError::InvalidSessionId(_)) => StatusCode::BAD_REQUEST,
            EngineError::Store(_)
            | EngineError::Source(_)
            | EngineError::Directory(_)
            | EngineError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.code(), err.to_string())
    }
}
