//! Rules Handlers
//!
//! Endpoint for dropping cached rule sets after the rule document changes.

use std::sync::Arc;

use axum::{Extension, Json};

use crate::protocol::rest::dto::{ApiResponse, InvalidateDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

/// Invalidate the rule set cache
pub async fn invalidate(
    Extension(handler): Extension<Arc<Handler>>,
) -> Result<Json<ApiResponse<InvalidateDto>>, RestError> {
    let stats = handler.invalidate_rules();
    Ok(Json(ApiResponse::success(InvalidateDto {
        invalidated: true,
        rule_cache: stats.into(),
    })))
}
