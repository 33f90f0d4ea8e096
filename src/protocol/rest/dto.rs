//! REST API Data Transfer Objects
//!
//! Defines request/response types for the REST API endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::actions::ActionStatus;
use crate::rules::CacheStats;

/// JSON response: { success, data?, error? }
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorDto>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ApiErrorDto) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error details in API response
#[derive(Debug, Serialize)]
pub struct ApiErrorDto {
    pub code: String,
    pub message: String,
}

// Admin DTOs
/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthDto {
    /// `healthy`, or `degraded` once most turns fail
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub turns: TurnStatsDto,
    pub actions: ActionStatsDto,
    /// Seconds between expiry sweeps, absent when sweeping is off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reap_interval_secs: Option<u64>,
    pub rule_cache: CacheStatsDto,
}

/// Inference turn counters
#[derive(Debug, Serialize)]
pub struct TurnStatsDto {
    pub total: u64,
    pub failed: u64,
    pub failure_rate: f64,
}

/// Action handler counters
#[derive(Debug, Serialize)]
pub struct ActionStatsDto {
    pub registered: usize,
    pub in_flight: usize,
}

/// Rule set cache statistics
#[derive(Debug, Serialize)]
pub struct CacheStatsDto {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub invalidations: usize,
    pub loads: usize,
    pub hit_rate: f64,
    pub cached_rule_sets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
}

impl From<CacheStats> for CacheStatsDto {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            expirations: stats.expirations,
            invalidations: stats.invalidations,
            loads: stats.loads,
            cached_rule_sets: stats.cached_rule_sets,
            age_secs: stats.age_secs,
        }
    }
}

// Session DTOs
/// Inference request; the session id comes from the path
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferRequest {
    /// Dialled address
    #[serde(default, alias = "triggerInput")]
    pub trigger: Option<String>,
    /// Caller's address
    #[serde(default, alias = "callerAddress")]
    pub caller: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// String projection of a session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDto {
    pub session_id: String,
    pub attributes: BTreeMap<String, String>,
}

/// `keyN`/`valueN` pairs, sent flat
pub type SetStateRequest = BTreeMap<String, String>;

/// Keypad menu selection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmfMenuRequest {
    pub selected_option: String,
}

/// Keypad input; absent means the caller entered nothing
#[derive(Debug, Default, Deserialize)]
pub struct DtmfInputRequest {
    #[serde(default)]
    pub input: Option<String>,
}

// Action DTOs
/// Result of starting an action
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartActionDto {
    pub session_id: String,
    pub status: ActionStatus,
}

// Rule DTOs
/// Result of a cache invalidation
#[derive(Debug, Serialize)]
pub struct InvalidateDto {
    pub invalidated: bool,
    pub rule_cache: CacheStatsDto,
}
