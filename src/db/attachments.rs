//! Attachment metadata operations.
//!
//! Only metadata lives in the database. File content is kept by
//! [`crate::files::FileStore`] under the generated `filename`.

use super::todos::todo_exists;
use super::{Database, now_ms, optional};
use crate::error::ApiError;
use crate::types::{Attachment, NewAttachment, from_ms};
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

fn parse_attachment_row(row: &Row) -> rusqlite::Result<Attachment> {
    let uploaded_at: i64 = row.get("uploaded_at")?;
    Ok(Attachment {
        id: row.get("id")?,
        todo_id: row.get("todo_id")?,
        filename: row.get("filename")?,
        original_name: row.get("original_name")?,
        mime_type: row.get("mime_type")?,
        size_bytes: row.get("size_bytes")?,
        uploaded_at: from_ms(uploaded_at),
    })
}

/// Attachments of one todo in upload order.
pub(crate) fn attachments_for_todo(conn: &Connection, todo_id: &str) -> Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM attachments WHERE todo_id = ?1 ORDER BY uploaded_at, rowid",
    )?;
    let attachments = stmt
        .query_map(params![todo_id], parse_attachment_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(attachments)
}

impl Database {
    /// Record metadata for content already written to the file store.
    pub fn add_attachment(&self, input: NewAttachment) -> Result<Attachment> {
        let attachment = Attachment {
            id: Uuid::now_v7().to_string(),
            todo_id: input.todo_id,
            filename: input.filename,
            original_name: input.original_name,
            mime_type: input.mime_type,
            size_bytes: input.size_bytes,
            uploaded_at: from_ms(now_ms()),
        };

        self.with_conn(|conn| {
            if !todo_exists(conn, &attachment.todo_id)? {
                return Err(ApiError::todo_not_found(&attachment.todo_id).into());
            }

            conn.execute(
                "INSERT INTO attachments (id, todo_id, filename, original_name, mime_type, size_bytes, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &attachment.id,
                    &attachment.todo_id,
                    &attachment.filename,
                    &attachment.original_name,
                    &attachment.mime_type,
                    attachment.size_bytes,
                    attachment.uploaded_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })?;

        tracing::debug!(
            attachment_id = %attachment.id,
            todo_id = %attachment.todo_id,
            size_bytes = attachment.size_bytes,
            "recorded attachment"
        );
        Ok(attachment)
    }

    pub fn get_attachment(&self, attachment_id: &str) -> Result<Option<Attachment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM attachments WHERE id = ?1")?;
            optional(stmt.query_row(params![attachment_id], parse_attachment_row))
        })
    }

    /// Attachments of a todo. Fails with not-found if the todo is missing.
    pub fn list_attachments(&self, todo_id: &str) -> Result<Vec<Attachment>> {
        self.with_conn(|conn| {
            if !todo_exists(conn, todo_id)? {
                return Err(ApiError::todo_not_found(todo_id).into());
            }
            attachments_for_todo(conn, todo_id)
        })
    }

    /// Remove the metadata row and return it so the caller can drop the content.
    pub fn delete_attachment(&self, attachment_id: &str) -> Result<Attachment> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM attachments WHERE id = ?1")?;
            let attachment = optional(stmt.query_row(params![attachment_id], parse_attachment_row))?
                .ok_or_else(|| ApiError::attachment_not_found(attachment_id))?;

            conn.execute("DELETE FROM attachments WHERE id = ?1", params![attachment_id])?;
            Ok(attachment)
        })
    }
}
