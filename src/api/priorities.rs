//! Priority level endpoints.

use super::AppState;
use super::extract::ApiJson;
use crate::error::{ApiError, ApiResult};
use crate::types::{PRIORITY_MAX, PRIORITY_MIN, Priority, PriorityLevel, PriorityPatch};
use axum::Json;
use axum::extract::{Path, State};

pub async fn list_priorities(State(state): State<AppState>) -> ApiResult<Json<Vec<PriorityLevel>>> {
    let levels = state.db.list_priorities()?;
    Ok(Json(levels.as_ref().clone()))
}

/// Parse a level from the path; anything outside 1..=10 is a bad request.
fn parse_level(raw: &str) -> ApiResult<Priority> {
    let level: Priority = raw.trim().parse().map_err(|_| {
        ApiError::invalid_value("level", format!("level must be an integer, got '{}'", raw))
    })?;
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&level) {
        return Err(ApiError::invalid_value(
            "level",
            format!(
                "Priority level must be between {} and {}",
                PRIORITY_MIN, PRIORITY_MAX
            ),
        ));
    }
    Ok(level)
}

pub async fn update_priority(
    State(state): State<AppState>,
    Path(level): Path<String>,
    ApiJson(patch): ApiJson<PriorityPatch>,
) -> ApiResult<Json<PriorityLevel>> {
    let level = parse_level(&level)?;
    Ok(Json(state.db.update_priority(level, patch)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_must_be_in_range() {
        assert_eq!(parse_level("1").unwrap(), 1);
        assert_eq!(parse_level("10").unwrap(), 10);
        assert!(parse_level("0").is_err());
        assert!(parse_level("11").is_err());
        assert!(parse_level("high").is_err());
    }
}
