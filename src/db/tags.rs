//! Tag CRUD and todo-tag links.

use super::{Database, is_unique_violation, now_ms, optional};
use crate::error::ApiError;
use crate::types::{
    NewTag, TAG_NAME_MAX_CHARS, Tag, TagPatch, from_ms, validate_color, validate_name,
};
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

fn parse_tag_row(row: &Row) -> rusqlite::Result<Tag> {
    let created_at: i64 = row.get("created_at")?;
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        created_at: from_ms(created_at),
    })
}

fn get_tag_internal(conn: &Connection, tag_id: &str) -> Result<Option<Tag>> {
    let mut stmt = conn.prepare("SELECT * FROM tags WHERE id = ?1")?;
    optional(stmt.query_row(params![tag_id], parse_tag_row))
}

/// Tags linked to a todo, alphabetical.
pub(crate) fn tags_for_todo(conn: &Connection, todo_id: &str) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.* FROM tags t
         INNER JOIN todo_tags tt ON tt.tag_id = t.id
         WHERE tt.todo_id = ?1
         ORDER BY t.name COLLATE NOCASE, t.rowid",
    )?;
    let tags = stmt
        .query_map(params![todo_id], parse_tag_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}

fn map_conflict(err: rusqlite::Error, name: &str) -> anyhow::Error {
    if is_unique_violation(&err) {
        ApiError::already_exists("tag", name).into()
    } else {
        err.into()
    }
}

impl Database {
    pub fn create_tag(&self, input: NewTag) -> Result<Tag> {
        let name = match input.name {
            Some(ref n) => validate_name("name", n, TAG_NAME_MAX_CHARS)?,
            None => return Err(ApiError::missing_field("name").into()),
        };
        let color = validate_color(input.color)?;

        let tag = Tag {
            id: Uuid::now_v7().to_string(),
            name,
            color,
            created_at: from_ms(now_ms()),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tags (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    &tag.id,
                    &tag.name,
                    &tag.color,
                    tag.created_at.timestamp_millis()
                ],
            )
            .map_err(|e| map_conflict(e, &tag.name))?;
            Ok(())
        })?;

        tracing::debug!(tag_id = %tag.id, name = %tag.name, "created tag");
        Ok(tag)
    }

    pub fn get_tag(&self, tag_id: &str) -> Result<Option<Tag>> {
        self.with_conn(|conn| get_tag_internal(conn, tag_id))
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tags ORDER BY name COLLATE NOCASE, rowid")?;
            let tags = stmt
                .query_map([], parse_tag_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }

    pub fn update_tag(&self, tag_id: &str, patch: TagPatch) -> Result<Tag> {
        self.with_conn(|conn| {
            let mut tag =
                get_tag_internal(conn, tag_id)?.ok_or_else(|| ApiError::tag_not_found(tag_id))?;

            if let Some(ref n) = patch.name {
                tag.name = validate_name("name", n, TAG_NAME_MAX_CHARS)?;
            }
            if let Some(color) = patch.color {
                tag.color = validate_color(color)?;
            }

            conn.execute(
                "UPDATE tags SET name = ?1, color = ?2 WHERE id = ?3",
                params![&tag.name, &tag.color, tag_id],
            )
            .map_err(|e| map_conflict(e, &tag.name))?;

            Ok(tag)
        })
    }

    /// Delete a tag and every link to it. Linked todos are kept.
    pub fn delete_tag(&self, tag_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tags WHERE id = ?1", params![tag_id])?;
            if deleted == 0 {
                return Err(ApiError::tag_not_found(tag_id).into());
            }
            tracing::debug!(tag_id, "deleted tag");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{NewTodo, TodoPatch};

    fn tag(db: &Database, name: &str) -> Tag {
        db.create_tag(NewTag {
            name: Some(name.into()),
            color: None,
        })
        .unwrap()
    }

    #[test]
    fn todo_tags_are_returned_sorted() {
        let db = Database::open_in_memory().unwrap();
        let zeta = tag(&db, "zeta");
        let alpha = tag(&db, "Alpha");

        let view = db
            .create_todo(NewTodo {
                tag_ids: vec![zeta.id.clone(), alpha.id.clone(), zeta.id.clone()],
                ..NewTodo::titled("tagged")
            })
            .unwrap();

        let names: Vec<_> = view.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
    }

    #[test]
    fn unknown_tag_is_a_validation_error() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_todo(NewTodo {
                tag_ids: vec!["missing".into()],
                ..NewTodo::titled("tagged")
            })
            .unwrap_err();
        let err = ApiError::from(err);
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
        assert_eq!(err.field.as_deref(), Some("tag_ids"));
        assert_eq!(db.count_todos().unwrap(), 0);
    }

    #[test]
    fn deleting_tag_unlinks_but_keeps_todo() {
        let db = Database::open_in_memory().unwrap();
        let home = tag(&db, "home");
        let view = db
            .create_todo(NewTodo {
                tag_ids: vec![home.id.clone()],
                ..NewTodo::titled("sweep")
            })
            .unwrap();

        db.delete_tag(&home.id).unwrap();

        let view = db.get_todo_view(&view.todo.id).unwrap().unwrap();
        assert!(view.tags.is_empty());
    }

    #[test]
    fn update_replaces_tag_set() {
        let db = Database::open_in_memory().unwrap();
        let a = tag(&db, "a");
        let b = tag(&db, "b");
        let view = db
            .create_todo(NewTodo {
                tag_ids: vec![a.id.clone()],
                ..NewTodo::titled("retag")
            })
            .unwrap();

        let view = db
            .update_todo(
                &view.todo.id,
                TodoPatch {
                    tag_ids: Some(vec![b.id.clone()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(view.tags, vec![b]);
    }
}
