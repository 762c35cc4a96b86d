//! Tag endpoints.

use super::AppState;
use super::extract::ApiJson;
use crate::error::{ApiError, ApiResult};
use crate::types::{ListResponse, NewTag, Tag, TagPatch};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<ListResponse<Tag>>> {
    Ok(Json(state.db.list_tags()?.into()))
}

pub async fn create_tag(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTag>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let tag = state.db.create_tag(input)?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn get_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
) -> ApiResult<Json<Tag>> {
    state
        .db
        .get_tag(&tag_id)?
        .map(Json)
        .ok_or_else(|| ApiError::tag_not_found(&tag_id))
}

pub async fn update_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
    ApiJson(patch): ApiJson<TagPatch>,
) -> ApiResult<Json<Tag>> {
    Ok(Json(state.db.update_tag(&tag_id, patch)?))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_tag(&tag_id)?;
    Ok(StatusCode::NO_CONTENT)
}
