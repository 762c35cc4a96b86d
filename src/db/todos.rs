//! Todo CRUD operations.

use super::tree::{
    SUBTREE_CTE, check_depth, load_view, subtree_height, subtree_ids, would_create_cycle,
};
use super::{Database, now_ms, optional};
use crate::error::ApiError;
use crate::types::{
    DeleteSummary, NewTodo, PRIORITY_DEFAULT, Todo, TodoPatch, TodoView, from_ms,
    validate_priority, validate_title,
};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

pub fn parse_todo_row(row: &Row) -> rusqlite::Result<Todo> {
    let due_date: Option<i64> = row.get("due_date")?;
    let completed_at: Option<i64> = row.get("completed_at")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;

    Ok(Todo {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        due_date: due_date.map(from_ms),
        priority: row.get("priority")?,
        completed: row.get("completed")?,
        completed_at: completed_at.map(from_ms),
        parent_id: row.get("parent_id")?,
        category_id: row.get("category_id")?,
        created_at: from_ms(created_at),
        updated_at: from_ms(updated_at),
    })
}

/// Internal helper to get a todo using an existing connection (avoids deadlock).
pub(crate) fn get_todo_internal(conn: &Connection, todo_id: &str) -> Result<Option<Todo>> {
    let mut stmt = conn.prepare("SELECT t.* FROM todos t WHERE t.id = ?1")?;
    optional(stmt.query_row(params![todo_id], parse_todo_row))
}

pub(crate) fn todo_exists(conn: &Connection, todo_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM todos WHERE id = ?1",
            params![todo_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// A referenced category must exist.
fn ensure_category(conn: &Connection, category_id: &str) -> Result<()> {
    let found = conn
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1",
            params![category_id],
            |_| Ok(()),
        )
        .optional()?;
    if found.is_none() {
        return Err(ApiError::invalid_value(
            "category_id",
            format!("Category not found: {}", category_id),
        )
        .into());
    }
    Ok(())
}

/// All referenced tags must exist. Returns the ids de-duplicated, order kept.
fn ensure_tags(conn: &Connection, tag_ids: &[String]) -> Result<Vec<String>> {
    let mut unique: Vec<String> = Vec::with_capacity(tag_ids.len());
    for id in tag_ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }

    let mut stmt = conn.prepare("SELECT 1 FROM tags WHERE id = ?1")?;
    let mut missing = Vec::new();
    for id in &unique {
        if stmt.query_row(params![id], |_| Ok(())).optional()?.is_none() {
            missing.push(id.as_str());
        }
    }

    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(ApiError::invalid_value(
            "tag_ids",
            format!("{} tag(s) not found", missing.len()),
        )
        .with_details(missing.join(", "))
        .into());
    }
    Ok(unique)
}

/// Replace the tag links of a todo.
fn sync_todo_tags(conn: &Connection, todo_id: &str, tag_ids: &[String]) -> Result<()> {
    conn.execute("DELETE FROM todo_tags WHERE todo_id = ?1", params![todo_id])?;
    for tag_id in tag_ids {
        conn.execute(
            "INSERT INTO todo_tags (todo_id, tag_id) VALUES (?1, ?2)",
            params![todo_id, tag_id],
        )?;
    }
    Ok(())
}

fn insert_todo(conn: &Connection, input: NewTodo, max_depth: usize) -> Result<String> {
    let title = validate_title(input.title.as_deref())?;
    let priority = validate_priority(input.priority.unwrap_or(PRIORITY_DEFAULT))?;

    if let Some(ref cid) = input.category_id {
        ensure_category(conn, cid)?;
    }
    let tag_ids = ensure_tags(conn, &input.tag_ids)?;

    if let Some(ref pid) = input.parent_id {
        if !todo_exists(conn, pid)? {
            return Err(ApiError::invalid_value(
                "parent_id",
                format!("Parent todo not found: {}", pid),
            )
            .into());
        }
        check_depth(conn, pid, 0, max_depth)?;
    }

    let todo_id = Uuid::now_v7().to_string();
    let now = now_ms();

    conn.execute(
        "INSERT INTO todos (
            id, title, description, due_date, priority, completed, completed_at,
            parent_id, category_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6, ?7, ?8, ?9)",
        params![
            &todo_id,
            title,
            input.description,
            input.due_date.map(|d| d.timestamp_millis()),
            priority,
            input.parent_id,
            input.category_id,
            now,
            now,
        ],
    )?;

    sync_todo_tags(conn, &todo_id, &tag_ids)?;

    Ok(todo_id)
}

fn require_view(conn: &Connection, todo_id: &str) -> Result<TodoView> {
    let todo = get_todo_internal(conn, todo_id)?
        .ok_or_else(|| ApiError::todo_not_found(todo_id))?;
    load_view(conn, todo)
}

impl Database {
    /// Create a new todo. `parent_id`, if given, must name an existing todo.
    #[tracing::instrument(skip(self, input), fields(title = ?input.title))]
    pub fn create_todo(&self, input: NewTodo) -> Result<TodoView> {
        let max_depth = self.max_subtask_depth();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let todo_id = insert_todo(&tx, input, max_depth)?;
            tx.commit()?;

            tracing::debug!(todo_id = %todo_id, "created todo");
            require_view(conn, &todo_id)
        })
    }

    /// Create a todo under `parent_id`. Fails with not-found if the parent is missing.
    #[tracing::instrument(skip(self, input))]
    pub fn add_subtask(&self, parent_id: &str, mut input: NewTodo) -> Result<TodoView> {
        let max_depth = self.max_subtask_depth();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !todo_exists(&tx, parent_id)? {
                return Err(ApiError::todo_not_found(parent_id).into());
            }
            input.parent_id = Some(parent_id.to_string());
            let todo_id = insert_todo(&tx, input, max_depth)?;
            tx.commit()?;

            tracing::debug!(todo_id = %todo_id, parent_id, "created subtask");
            require_view(conn, &todo_id)
        })
    }

    /// Get a todo row by ID.
    pub fn get_todo(&self, todo_id: &str) -> Result<Option<Todo>> {
        self.with_conn(|conn| get_todo_internal(conn, todo_id))
    }

    /// Total number of todo records, subtasks included.
    pub fn count_todos(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM todos", [], |row| row.get(0))?;
            Ok(count)
        })
    }

    /// Apply a partial update. Validation failures leave the todo untouched.
    #[tracing::instrument(skip(self, patch))]
    pub fn update_todo(&self, todo_id: &str, patch: TodoPatch) -> Result<TodoView> {
        let max_depth = self.max_subtask_depth();
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let todo = get_todo_internal(&tx, todo_id)?
                .ok_or_else(|| ApiError::todo_not_found(todo_id))?;

            let title = match patch.title {
                Some(ref t) => validate_title(Some(t.as_str()))?,
                None => todo.title.clone(),
            };
            let priority = match patch.priority {
                Some(p) => validate_priority(p)?,
                None => todo.priority,
            };
            let description = patch.description.unwrap_or(todo.description.clone());
            let due_date = patch
                .due_date
                .unwrap_or(todo.due_date)
                .map(|d| d.timestamp_millis());

            let category_id = match patch.category_id {
                Some(Some(cid)) => {
                    ensure_category(&tx, &cid)?;
                    Some(cid)
                }
                Some(None) => None,
                None => todo.category_id.clone(),
            };

            let parent_id = match patch.parent_id {
                Some(new_parent) if new_parent != todo.parent_id => {
                    if let Some(ref pid) = new_parent {
                        if !todo_exists(&tx, pid)? {
                            return Err(ApiError::invalid_value(
                                "parent_id",
                                format!("Parent todo not found: {}", pid),
                            )
                            .into());
                        }
                        if would_create_cycle(&tx, todo_id, pid)? {
                            return Err(ApiError::subtask_cycle(todo_id, pid).into());
                        }
                        let height = subtree_height(&tx, todo_id)?;
                        check_depth(&tx, pid, height, max_depth)?;
                    }
                    new_parent
                }
                _ => todo.parent_id.clone(),
            };

            let (completed, completed_at) = match patch.completed {
                Some(true) if !todo.completed => (true, Some(now)),
                Some(false) => (false, None),
                _ => (
                    todo.completed,
                    todo.completed_at.map(|d| d.timestamp_millis()),
                ),
            };

            if let Some(ref tag_ids) = patch.tag_ids {
                let tag_ids = ensure_tags(&tx, tag_ids)?;
                sync_todo_tags(&tx, todo_id, &tag_ids)?;
            }

            tx.execute(
                "UPDATE todos SET title = ?1, description = ?2, due_date = ?3, priority = ?4,
                    completed = ?5, completed_at = ?6, parent_id = ?7, category_id = ?8,
                    updated_at = ?9
                 WHERE id = ?10",
                params![
                    title,
                    description,
                    due_date,
                    priority,
                    completed,
                    completed_at,
                    parent_id,
                    category_id,
                    now,
                    todo_id,
                ],
            )?;

            tx.commit()?;
            require_view(conn, todo_id)
        })
    }

    /// Set the completion flag. Idempotent: repeating keeps the first `completed_at`.
    #[tracing::instrument(skip(self))]
    pub fn set_completed(&self, todo_id: &str, completed: bool) -> Result<TodoView> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let todo = get_todo_internal(&tx, todo_id)?
                .ok_or_else(|| ApiError::todo_not_found(todo_id))?;

            if todo.completed != completed {
                tx.execute(
                    "UPDATE todos SET completed = ?1, completed_at = ?2, updated_at = ?3 WHERE id = ?4",
                    params![completed, completed.then_some(now), now, todo_id],
                )?;
            }
            tx.commit()?;

            require_view(conn, todo_id)
        })
    }

    pub fn complete_todo(&self, todo_id: &str) -> Result<TodoView> {
        self.set_completed(todo_id, true)
    }

    pub fn uncomplete_todo(&self, todo_id: &str) -> Result<TodoView> {
        self.set_completed(todo_id, false)
    }

    /// Delete a todo, its whole subtask subtree and their attachments as one unit.
    ///
    /// The returned summary lists the stored attachment files; removing them
    /// from the file store is the caller's job once the rows are gone.
    #[tracing::instrument(skip(self))]
    pub fn delete_todo(&self, todo_id: &str) -> Result<DeleteSummary> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !todo_exists(&tx, todo_id)? {
                return Err(ApiError::todo_not_found(todo_id).into());
            }

            let ids = subtree_ids(&tx, todo_id)?;

            let files: Vec<String> = {
                let sql = format!(
                    "{} SELECT a.filename FROM attachments a
                     WHERE a.todo_id IN (SELECT id FROM subtree)
                     ORDER BY a.uploaded_at, a.rowid",
                    SUBTREE_CTE
                );
                let mut stmt = tx.prepare(&sql)?;
                let names = stmt
                    .query_map(params![todo_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                names
            };

            let attachments_deleted = tx.execute(
                &format!(
                    "{} DELETE FROM attachments WHERE todo_id IN (SELECT id FROM subtree)",
                    SUBTREE_CTE
                ),
                params![todo_id],
            )?;
            // Leaves first, so no ON DELETE CASCADE chain has to unwind a deep subtree.
            {
                let mut stmt = tx.prepare("DELETE FROM todos WHERE id = ?1")?;
                for id in ids.iter().rev() {
                    stmt.execute(params![id])?;
                }
            }

            tx.commit()?;

            tracing::info!(
                todo_id,
                todos_deleted = ids.len(),
                attachments_deleted,
                "deleted todo subtree"
            );

            Ok(DeleteSummary {
                todos_deleted: ids.len(),
                attachments_deleted,
                files,
            })
        })
    }
}
