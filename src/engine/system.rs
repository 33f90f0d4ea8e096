//! First-turn system attributes and caller capture

use crate::state::{keys, TrackedState};
use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Timelike, Utc};
use serde_json::json;

/// Dialled address used when the platform did not supply one
pub const UNKNOWN_DIALLED: &str = "Unknown";

/// `morning` before noon, `afternoon` until 18:00, `evening` after
pub fn time_of_day(local_hour: u32) -> &'static str {
    match local_hour {
        0..=11 => "morning",
        12..=17 => "afternoon",
        _ => "evening",
    }
}

/// Fixed offset from minutes east of UTC, falling back to UTC when out of range
pub fn local_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Compute `System` once per session. Returns whether it was written.
pub fn ensure_system_attributes(
    state: &mut TrackedState,
    now: DateTime<Utc>,
    offset: FixedOffset,
    dialled: Option<&str>,
) -> bool {
    if state.contains(keys::SYSTEM) {
        return false;
    }

    let local = now.with_timezone(&offset);
    let dialled = dialled
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(UNKNOWN_DIALLED);

    let system = json!({
        "DialledNumber": dialled,
        "DateTimeUTC": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "DateTimeLocal": local.to_rfc3339_opts(SecondsFormat::Secs, false),
        "TimeLocal": local.format("%I:%M %p").to_string(),
        "TimeOfDay": time_of_day(local.hour()),
    });

    tracing::info!(dialled, time_of_day = time_of_day(local.hour()), "system_attributes_computed");
    state.set(keys::SYSTEM, system);
    true
}

/// Record the caller's address once, and remember the first one seen
pub fn capture_caller(state: &mut TrackedState, caller: Option<&str>) {
    if !state.contains(keys::CUSTOMER_PHONE) {
        if let Some(address) = caller.filter(|c| !c.is_empty()) {
            state.set(keys::CUSTOMER_PHONE, address);
            tracing::debug!(caller = address, "caller_address_captured");
        }
    }

    if !state.contains(keys::ORIGINAL_CUSTOMER_NUMBER) {
        if let Some(phone) = state.get_str(keys::CUSTOMER_PHONE).map(str::to_string) {
            state.set(keys::ORIGINAL_CUSTOMER_NUMBER, phone);
        }
    }
}
