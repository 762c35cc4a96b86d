//! Priority level storage.
//!
//! The ten levels are fixed; only their display name and color change.
//! Reads go through the in-memory snapshot in [`crate::cache`].

use super::{Database, optional};
use crate::error::ApiError;
use crate::types::{
    DEFAULT_PRIORITY_LEVELS, PRIORITY_NAME_MAX_CHARS, Priority, PriorityLevel, PriorityPatch,
    validate_color, validate_name,
};
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use std::sync::Arc;

fn parse_priority_row(row: &Row) -> rusqlite::Result<PriorityLevel> {
    Ok(PriorityLevel {
        level: row.get("level")?,
        name: row.get("name")?,
        color: row.get("color")?,
    })
}

fn load_levels(conn: &Connection) -> Result<Vec<PriorityLevel>> {
    let mut stmt = conn.prepare("SELECT level, name, color FROM priority_levels ORDER BY level")?;
    let levels = stmt
        .query_map([], parse_priority_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(levels)
}

impl Database {
    /// Insert any missing default levels. Existing rows are left untouched.
    pub(crate) fn seed_priority_levels(&self) -> Result<()> {
        let inserted = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            for (level, name, color) in DEFAULT_PRIORITY_LEVELS {
                inserted += tx.execute(
                    "INSERT OR IGNORE INTO priority_levels (level, name, color) VALUES (?1, ?2, ?3)",
                    params![level, name, color],
                )?;
            }
            tx.commit()?;
            Ok(inserted)
        })?;

        if inserted > 0 {
            tracing::info!(inserted, "seeded priority levels");
            self.priorities.invalidate();
        }
        Ok(())
    }

    /// All priority levels, lowest first.
    pub fn list_priorities(&self) -> Result<Arc<Vec<PriorityLevel>>> {
        self.priorities
            .get_or_fetch(|| self.with_conn(load_levels))
    }

    pub fn get_priority(&self, level: Priority) -> Result<Option<PriorityLevel>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT level, name, color FROM priority_levels WHERE level = ?1")?;
            optional(stmt.query_row(params![level], parse_priority_row))
        })
    }

    /// Rename or recolor a level. Invalidates the cached snapshot.
    pub fn update_priority(&self, level: Priority, patch: PriorityPatch) -> Result<PriorityLevel> {
        let updated = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT level, name, color FROM priority_levels WHERE level = ?1")?;
            let mut current = optional(stmt.query_row(params![level], parse_priority_row))?
                .ok_or_else(|| ApiError::priority_not_found(level.into()))?;

            if let Some(ref n) = patch.name {
                current.name = validate_name("name", n, PRIORITY_NAME_MAX_CHARS)?;
            }
            if let Some(color) = patch.color {
                current.color = validate_color(color)?;
            }

            conn.execute(
                "UPDATE priority_levels SET name = ?1, color = ?2 WHERE level = ?3",
                params![&current.name, &current.color, level],
            )?;
            Ok(current)
        })?;

        self.priorities.invalidate();
        tracing::debug!(level, name = %updated.name, "updated priority level");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.seed_priority_levels().unwrap();
        db.seed_priority_levels().unwrap();

        let levels = db.list_priorities().unwrap();
        assert_eq!(levels.len(), 10);
        assert_eq!(levels[0].name, "Lowest");
        assert_eq!(levels[9].name, "Urgent");
    }

    #[test]
    fn seeding_keeps_renamed_levels() {
        let db = Database::open_in_memory().unwrap();
        db.update_priority(
            10,
            PriorityPatch {
                name: Some("On fire".into()),
                color: None,
            },
        )
        .unwrap();

        db.seed_priority_levels().unwrap();
        assert_eq!(db.get_priority(10).unwrap().unwrap().name, "On fire");
    }

    #[test]
    fn update_refreshes_cached_listing() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.list_priorities().unwrap()[4].name, "Normal");

        db.update_priority(
            5,
            PriorityPatch {
                name: Some("Medium".into()),
                color: Some(None),
            },
        )
        .unwrap();

        let levels = db.list_priorities().unwrap();
        assert_eq!(levels[4].name, "Medium");
        assert_eq!(levels[4].color, None);
    }

    #[test]
    fn unknown_level_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.update_priority(42, PriorityPatch::default()).unwrap_err();
        assert_eq!(ApiError::from(err).code, crate::error::ErrorCode::PriorityNotFound);
    }
}
