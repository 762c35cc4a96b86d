//! Attachment upload, download and deletion.

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::files::{FileStore, FileStoreError, resolve_mime_type};
use crate::types::{Attachment, NewAttachment};
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Multipart form field carrying the file.
pub const FILE_FIELD: &str = "file";

fn multipart_error(err: MultipartError, limit: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(limit)
    } else {
        ApiError::invalid_value(FILE_FIELD, err.body_text())
    }
}

/// Read a field to the end, failing as soon as it grows past `limit`.
async fn read_limited(field: &mut Field<'_>, limit: u64, state: &AppState) -> ApiResult<Vec<u8>> {
    let mut content = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        state
            .uploads
            .check_size((content.len() + chunk.len()) as u64)?;
        content.extend_from_slice(&chunk);
    }
    Ok(content)
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
) -> ApiResult<Json<Vec<Attachment>>> {
    Ok(Json(state.db.list_attachments(&todo_id)?))
}

pub async fn upload_attachment(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Attachment>)> {
    if state.db.get_todo(&todo_id)?.is_none() {
        return Err(ApiError::todo_not_found(&todo_id));
    }

    let limit = state.uploads.max_size_bytes;
    let mut multipart =
        multipart.map_err(|e| ApiError::invalid_value(FILE_FIELD, e.body_text()))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::invalid_value(FILE_FIELD, "Filename is required"))?;
        state.uploads.check_extension(&original_name)?;

        let mime_type = resolve_mime_type(field.content_type(), &original_name);
        let content = read_limited(&mut field, limit, &state).await?;

        let filename = FileStore::generate_name(&original_name);
        state.files.write(&filename, &content).await?;

        let recorded = state.db.add_attachment(NewAttachment {
            todo_id: todo_id.clone(),
            filename: filename.clone(),
            original_name,
            mime_type,
            size_bytes: content.len() as i64,
        });

        return match recorded {
            Ok(attachment) => {
                tracing::info!(attachment_id = %attachment.id, size = attachment.size_bytes, "attachment uploaded");
                Ok((StatusCode::CREATED, Json(attachment)))
            }
            Err(e) => {
                state.files.remove_all([filename.as_str()]).await;
                Err(e.into())
            }
        };
    }

    Err(ApiError::missing_field(FILE_FIELD))
}

/// `Content-Disposition` with an ASCII fallback and the RFC 5987 UTF-8 name.
fn content_disposition(original_name: &str) -> String {
    let fallback: String = original_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(original_name)
    )
}

pub async fn download_attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<String>,
) -> ApiResult<Response> {
    let attachment = state
        .db
        .get_attachment(&attachment_id)?
        .ok_or_else(|| ApiError::attachment_not_found(&attachment_id))?;

    let content = match state.files.read(&attachment.filename).await {
        Ok(bytes) => bytes,
        Err(FileStoreError::NotFound(_)) => {
            tracing::warn!(attachment_id = %attachment.id, filename = %attachment.filename, "attachment content missing");
            return Err(ApiError::attachment_not_found(&attachment_id));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = HeaderValue::from_str(&attachment.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static(crate::files::FALLBACK_MIME_TYPE));
    let disposition =
        HeaderValue::from_str(&content_disposition(&attachment.original_name)).map_err(ApiError::internal)?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(content),
    )
        .into_response())
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<String>,
) -> ApiResult<StatusCode> {
    let attachment = state.db.delete_attachment(&attachment_id)?;
    state.files.remove_all([attachment.filename.as_str()]).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_escapes_non_ascii_names() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
        let header = content_disposition("naïve \"plan\".txt");
        assert!(header.starts_with("attachment; filename=\"na_ve _plan_.txt\""));
        assert!(header.ends_with("filename*=UTF-8''na%C3%AFve%20%22plan%22.txt"));
    }
}
