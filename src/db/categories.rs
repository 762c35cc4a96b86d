//! Category CRUD operations.

use super::{Database, is_unique_violation, now_ms, optional};
use crate::error::ApiError;
use crate::types::{
    CATEGORY_NAME_MAX_CHARS, Category, CategoryPatch, NewCategory, from_ms, validate_color,
    validate_icon, validate_name,
};
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

fn parse_category_row(row: &Row) -> rusqlite::Result<Category> {
    let created_at: i64 = row.get("created_at")?;
    Ok(Category {
        id: row.get("id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        icon: row.get("icon")?,
        created_at: from_ms(created_at),
    })
}

pub(crate) fn get_category_internal(conn: &Connection, category_id: &str) -> Result<Option<Category>> {
    let mut stmt = conn.prepare("SELECT * FROM categories WHERE id = ?1")?;
    optional(stmt.query_row(params![category_id], parse_category_row))
}

/// Translate a UNIQUE violation on `name` into a conflict error.
fn map_conflict(err: rusqlite::Error, name: &str) -> anyhow::Error {
    if is_unique_violation(&err) {
        ApiError::already_exists("category", name).into()
    } else {
        err.into()
    }
}

impl Database {
    pub fn create_category(&self, input: NewCategory) -> Result<Category> {
        let name = match input.name {
            Some(ref n) => validate_name("name", n, CATEGORY_NAME_MAX_CHARS)?,
            None => return Err(ApiError::missing_field("name").into()),
        };
        let color = validate_color(input.color)?;
        let icon = validate_icon(input.icon)?;

        let category = Category {
            id: Uuid::now_v7().to_string(),
            name,
            color,
            icon,
            created_at: from_ms(now_ms()),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO categories (id, name, color, icon, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &category.id,
                    &category.name,
                    &category.color,
                    &category.icon,
                    category.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| map_conflict(e, &category.name))?;
            Ok(())
        })?;

        tracing::debug!(category_id = %category.id, name = %category.name, "created category");
        Ok(category)
    }

    pub fn get_category(&self, category_id: &str) -> Result<Option<Category>> {
        self.with_conn(|conn| get_category_internal(conn, category_id))
    }

    /// All categories, alphabetical.
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM categories ORDER BY name COLLATE NOCASE, rowid")?;
            let categories = stmt
                .query_map([], parse_category_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(categories)
        })
    }

    pub fn update_category(&self, category_id: &str, patch: CategoryPatch) -> Result<Category> {
        self.with_conn(|conn| {
            let mut category = get_category_internal(conn, category_id)?
                .ok_or_else(|| ApiError::category_not_found(category_id))?;

            if let Some(ref n) = patch.name {
                category.name = validate_name("name", n, CATEGORY_NAME_MAX_CHARS)?;
            }
            if let Some(color) = patch.color {
                category.color = validate_color(color)?;
            }
            if let Some(icon) = patch.icon {
                category.icon = validate_icon(icon)?;
            }

            conn.execute(
                "UPDATE categories SET name = ?1, color = ?2, icon = ?3 WHERE id = ?4",
                params![&category.name, &category.color, &category.icon, category_id],
            )
            .map_err(|e| map_conflict(e, &category.name))?;

            Ok(category)
        })
    }

    /// Delete a category. Todos that referenced it keep existing with no category.
    pub fn delete_category(&self, category_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM categories WHERE id = ?1",
                params![category_id],
            )?;
            if deleted == 0 {
                return Err(ApiError::category_not_found(category_id).into());
            }
            tracing::debug!(category_id, "deleted category");
            Ok(())
        })
    }
}
