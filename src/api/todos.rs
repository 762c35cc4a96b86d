//! Todo endpoints.

use super::AppState;
use super::extract::{ApiJson, ApiQuery};
use crate::error::{ApiError, ApiResult};
use crate::types::{
    DEFAULT_PAGE_LIMIT, NewTodo, Priority, TodoFilter, TodoPage, TodoPatch, TodoView,
    parse_timestamp,
};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Raw list query. Everything arrives as text so each bad value can be
/// reported against its own parameter.
#[derive(Debug, Default, Deserialize)]
pub struct TodoListParams {
    pub completed: Option<String>,
    pub category_id: Option<String>,
    pub tag_id: Option<String>,
    pub due_before: Option<String>,
    pub due_after: Option<String>,
    pub q: Option<String>,
    pub priority_min: Option<String>,
    pub priority_max: Option<String>,
    pub parent_id: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_bool(field: &str, value: Option<String>) -> ApiResult<Option<bool>> {
    match present(value) {
        None => Ok(None),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ApiError::invalid_value(
                field,
                format!("{} must be true or false, got '{}'", field, v),
            )),
        },
    }
}

fn parse_int<T: std::str::FromStr>(field: &str, value: Option<String>) -> ApiResult<Option<T>> {
    match present(value) {
        None => Ok(None),
        Some(v) => v.trim().parse().map(Some).map_err(|_| {
            ApiError::invalid_value(field, format!("{} must be an integer, got '{}'", field, v))
        }),
    }
}

fn parse_time(field: &str, value: Option<String>) -> ApiResult<Option<DateTime<Utc>>> {
    match present(value) {
        None => Ok(None),
        Some(v) => parse_timestamp(&v).map(Some).ok_or_else(|| {
            ApiError::invalid_value(field, format!("{} is not a valid timestamp: '{}'", field, v))
        }),
    }
}

impl TodoListParams {
    /// Convert to a store filter. `page`/`page_size` (1-based) take
    /// precedence over `offset`/`limit` when given.
    pub fn into_filter(self) -> ApiResult<TodoFilter> {
        let offset: Option<i64> = parse_int("offset", self.offset)?;
        let limit: Option<i64> = parse_int("limit", self.limit)?;
        let page: Option<i64> = parse_int("page", self.page)?;
        let page_size: Option<i64> = parse_int("page_size", self.page_size)?;

        let (offset, limit) = if page.is_some() || page_size.is_some() {
            let page = page.unwrap_or(1);
            if page < 1 {
                return Err(ApiError::invalid_value("page", "page must be at least 1"));
            }
            let size = page_size.or(limit).unwrap_or(DEFAULT_PAGE_LIMIT);
            if size < 1 {
                return Err(ApiError::invalid_value("page_size", "page_size must be at least 1"));
            }
            ((page - 1).saturating_mul(size), size)
        } else {
            (offset.unwrap_or(0), limit.unwrap_or(DEFAULT_PAGE_LIMIT))
        };

        Ok(TodoFilter {
            completed: parse_bool("completed", self.completed)?,
            category_id: present(self.category_id),
            tag_id: present(self.tag_id),
            due_before: parse_time("due_before", self.due_before)?,
            due_after: parse_time("due_after", self.due_after)?,
            q: present(self.q),
            priority_min: parse_int::<Priority>("priority_min", self.priority_min)?,
            priority_max: parse_int::<Priority>("priority_max", self.priority_max)?,
            parent_id: present(self.parent_id),
            offset,
            limit,
        })
    }
}

pub async fn list_todos(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TodoListParams>,
) -> ApiResult<Json<TodoPage>> {
    let filter = params.into_filter()?;
    let page = state.db.list_todos(filter)?;
    Ok(Json(page))
}

pub async fn create_todo(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTodo>,
) -> ApiResult<(StatusCode, Json<TodoView>)> {
    let view = state.db.create_todo(input)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_todo(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
) -> ApiResult<Json<TodoView>> {
    state
        .db
        .get_todo_view(&todo_id)?
        .map(Json)
        .ok_or_else(|| ApiError::todo_not_found(&todo_id))
}

/// Serves both PUT and PATCH: absent fields are left unchanged.
pub async fn update_todo(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
    ApiJson(patch): ApiJson<TodoPatch>,
) -> ApiResult<Json<TodoView>> {
    let view = state.db.update_todo(&todo_id, patch)?;
    Ok(Json(view))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
) -> ApiResult<StatusCode> {
    let summary = state.db.delete_todo(&todo_id)?;
    state.files.remove_all(&summary.files).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete_todo(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
) -> ApiResult<Json<TodoView>> {
    Ok(Json(state.db.complete_todo(&todo_id)?))
}

pub async fn uncomplete_todo(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
) -> ApiResult<Json<TodoView>> {
    Ok(Json(state.db.uncomplete_todo(&todo_id)?))
}

pub async fn create_subtask(
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
    ApiJson(input): ApiJson<NewTodo>,
) -> ApiResult<(StatusCode, Json<TodoView>)> {
    let view = state.db.add_subtask(&parent_id, input)?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> TodoListParams {
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let uri: axum::http::Uri = format!("/api/todos?{}", query).parse().unwrap();
        axum::extract::Query::<TodoListParams>::try_from_uri(&uri)
            .unwrap()
            .0
    }

    #[test]
    fn defaults_to_first_page() {
        let filter = TodoListParams::default().into_filter().unwrap();
        assert_eq!(filter, TodoFilter::default());
    }

    #[test]
    fn page_and_page_size_map_to_offset() {
        let filter = params(&[("page", "3"), ("page_size", "20")])
            .into_filter()
            .unwrap();
        assert_eq!(filter.offset, 40);
        assert_eq!(filter.limit, 20);
    }

    #[test]
    fn blank_values_are_ignored() {
        let filter = params(&[("completed", ""), ("category_id", ""), ("q", "")])
            .into_filter()
            .unwrap();
        assert_eq!(filter.completed, None);
        assert_eq!(filter.category_id, None);
        assert_eq!(filter.q, None);
    }

    #[test]
    fn bad_values_name_their_parameter() {
        let err = params(&[("completed", "maybe")]).into_filter().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("completed"));

        let err = params(&[("due_before", "tomorrow")]).into_filter().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("due_before"));

        let err = params(&[("page", "0")]).into_filter().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("page"));
    }

    #[test]
    fn parses_due_window_and_flags() {
        let filter = params(&[
            ("completed", "false"),
            ("due_after", "2024-01-01"),
            ("due_before", "2024-01-31T23:59:59Z"),
            ("priority_min", "7"),
        ])
        .into_filter()
        .unwrap();
        assert_eq!(filter.completed, Some(false));
        assert!(filter.due_after.unwrap() < filter.due_before.unwrap());
        assert_eq!(filter.priority_min, Some(7));
    }
}
