//! Filtered, ordered, paginated todo listing.

use super::todos::parse_todo_row;
use super::tree::load_view;
use super::{Database, escape_like};
use crate::error::ApiError;
use crate::types::{
    MAX_PAGE_LIMIT, PRIORITY_MAX, PRIORITY_MIN, Todo, TodoFilter, TodoPage, validate_priority,
};
use anyhow::Result;

/// Highest priority first, then earliest due date with undated todos last,
/// then oldest. `rowid` breaks the remaining ties by insertion order.
const ORDER_CLAUSE: &str =
    "t.priority DESC, t.due_date IS NULL, t.due_date ASC, t.created_at ASC, t.rowid ASC";

/// Reject malformed bounds and clamp the page size.
fn normalize(mut filter: TodoFilter) -> Result<TodoFilter, ApiError> {
    if filter.offset < 0 {
        return Err(ApiError::invalid_value("offset", "offset must not be negative"));
    }
    if filter.limit < 1 {
        return Err(ApiError::invalid_value("limit", "limit must be at least 1"));
    }
    filter.limit = filter.limit.min(MAX_PAGE_LIMIT);

    for (field, bound) in [
        ("priority_min", filter.priority_min),
        ("priority_max", filter.priority_max),
    ] {
        if let Some(p) = bound {
            validate_priority(p).map_err(|_| {
                ApiError::invalid_value(
                    field,
                    format!(
                        "{} must be between {} and {}",
                        field, PRIORITY_MIN, PRIORITY_MAX
                    ),
                )
            })?;
        }
    }

    filter.q = filter
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    Ok(filter)
}

/// WHERE clause and its parameters for a normalized filter.
fn build_where(filter: &TodoFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut sql = String::new();
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    match filter.parent_id {
        Some(ref pid) => {
            sql.push_str(" WHERE t.parent_id = ?");
            params_vec.push(Box::new(pid.clone()));
        }
        None => sql.push_str(" WHERE t.parent_id IS NULL"),
    }

    if let Some(completed) = filter.completed {
        sql.push_str(" AND t.completed = ?");
        params_vec.push(Box::new(completed));
    }

    if let Some(ref cid) = filter.category_id {
        sql.push_str(" AND t.category_id = ?");
        params_vec.push(Box::new(cid.clone()));
    }

    if let Some(ref tid) = filter.tag_id {
        sql.push_str(" AND EXISTS (SELECT 1 FROM todo_tags tt WHERE tt.todo_id = t.id AND tt.tag_id = ?)");
        params_vec.push(Box::new(tid.clone()));
    }

    // A NULL due_date fails both comparisons, so undated todos drop out.
    if let Some(before) = filter.due_before {
        sql.push_str(" AND t.due_date <= ?");
        params_vec.push(Box::new(before.timestamp_millis()));
    }
    if let Some(after) = filter.due_after {
        sql.push_str(" AND t.due_date >= ?");
        params_vec.push(Box::new(after.timestamp_millis()));
    }

    if let Some(ref q) = filter.q {
        // LIKE is case-insensitive for ASCII in SQLite.
        sql.push_str(" AND t.title LIKE ? ESCAPE '\\'");
        params_vec.push(Box::new(format!("%{}%", escape_like(q))));
    }

    if let Some(min) = filter.priority_min {
        sql.push_str(" AND t.priority >= ?");
        params_vec.push(Box::new(min));
    }
    if let Some(max) = filter.priority_max {
        sql.push_str(" AND t.priority <= ?");
        params_vec.push(Box::new(max));
    }

    (sql, params_vec)
}

impl Database {
    /// List todos matching `filter`, each with its subtree resolved.
    ///
    /// Without `parent_id` only top-level todos are listed; with it, the direct
    /// children of that todo. `total` counts every match regardless of paging.
    #[tracing::instrument(skip(self))]
    pub fn list_todos(&self, filter: TodoFilter) -> Result<TodoPage> {
        let filter = normalize(filter)?;

        self.with_conn(|conn| {
            let (where_clause, params_vec) = build_where(&filter);
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM todos t{}", where_clause),
                params_refs.as_slice(),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT t.* FROM todos t{} ORDER BY {} LIMIT {} OFFSET {}",
                where_clause, ORDER_CLAUSE, filter.limit, filter.offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let todos = stmt
                .query_map(params_refs.as_slice(), parse_todo_row)?
                .collect::<rusqlite::Result<Vec<Todo>>>()?;

            let mut items = Vec::with_capacity(todos.len());
            for todo in todos {
                items.push(load_view(conn, todo)?);
            }

            Ok(TodoPage {
                items,
                total,
                offset: filter.offset,
                limit: filter.limit,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn normalize_clamps_limit_and_blanks_query() {
        let filter = normalize(TodoFilter {
            limit: 10_000,
            q: Some("   ".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.limit, MAX_PAGE_LIMIT);
        assert_eq!(filter.q, None);
    }

    #[test]
    fn normalize_rejects_bad_bounds() {
        let err = normalize(TodoFilter {
            offset: -1,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("offset"));

        let err = normalize(TodoFilter {
            priority_max: Some(11),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
        assert_eq!(err.field.as_deref(), Some("priority_max"));
    }

    #[test]
    fn like_wildcards_match_literally() {
        let db = Database::open_in_memory().unwrap();
        db.create_todo(crate::types::NewTodo::titled("100% done")).unwrap();
        db.create_todo(crate::types::NewTodo::titled("1000 done")).unwrap();

        let page = db
            .list_todos(TodoFilter {
                q: Some("0%".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].todo.title, "100% done");
    }
}
