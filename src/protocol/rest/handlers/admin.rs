//! Admin Handlers
//!
//! Engine health: turn outcomes, action handlers, expiry sweeping and the
//! rule set cache.

use std::sync::Arc;

use axum::{Extension, Json};

use crate::protocol::rest::dto::{ActionStatsDto, ApiResponse, HealthDto, TurnStatsDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;

/// Failure rate at or above which the engine reports itself degraded
const DEGRADED_FAILURE_RATE: f64 = 0.5;

fn turn_stats(total: u64, failed: u64) -> TurnStatsDto {
    let failure_rate = if total == 0 {
        0.0
    } else {
        failed as f64 / total as f64
    };
    TurnStatsDto {
        total,
        failed,
        failure_rate,
    }
}

/// GET /health
pub async fn health(
    Extension(handler): Extension<Arc<Handler>>,
) -> Result<Json<ApiResponse<HealthDto>>, RestError> {
    let turns = turn_stats(handler.total_turns(), handler.failed_turns());
    let status = if turns.failure_rate >= DEGRADED_FAILURE_RATE {
        "degraded"
    } else {
        "healthy"
    };
    let registry = handler.registry();

    let health = HealthDto {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: handler.uptime_seconds(),
        turns,
        actions: ActionStatsDto {
            registered: registry.len(),
            in_flight: registry.in_flight(),
        },
        reap_interval_secs: handler.reap_interval().map(|d| d.as_secs()),
        rule_cache: handler.cache_stats().into(),
    };

    Ok(Json(ApiResponse::success(health)))
}
