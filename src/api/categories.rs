//! Category endpoints.

use super::AppState;
use super::extract::ApiJson;
use crate::error::{ApiError, ApiResult};
use crate::types::{Category, CategoryPatch, ListResponse, NewCategory};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResult<Json<ListResponse<Category>>> {
    Ok(Json(state.db.list_categories()?.into()))
}

pub async fn create_category(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state.db.create_category(input)?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> ApiResult<Json<Category>> {
    state
        .db
        .get_category(&category_id)?
        .map(Json)
        .ok_or_else(|| ApiError::category_not_found(&category_id))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
    ApiJson(patch): ApiJson<CategoryPatch>,
) -> ApiResult<Json<Category>> {
    Ok(Json(state.db.update_category(&category_id, patch)?))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_category(&category_id)?;
    Ok(StatusCode::NO_CONTENT)
}
