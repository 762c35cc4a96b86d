//! Subtask tree operations.
//!
//! Parent links live only in `todos.parent_id`; every traversal here walks ids
//! through the database rather than holding back-references in memory.

use super::Database;
use super::attachments::attachments_for_todo;
use super::categories::get_category_internal;
use super::tags::tags_for_todo;
use super::todos::{get_todo_internal, parse_todo_row};
use crate::error::ApiError;
use crate::types::{Todo, TodoView};
use anyhow::Result;
use rusqlite::{Connection, params};
use std::collections::{HashMap, HashSet};

/// `subtree(id)`: the todo bound to ?1 plus every descendant.
pub(crate) const SUBTREE_CTE: &str = "WITH RECURSIVE subtree(id) AS (
        SELECT ?1
        UNION
        SELECT t.id FROM todos t INNER JOIN subtree s ON t.parent_id = s.id
    )";

/// Depth-annotated variant; the bound only matters if parent links are corrupt.
const SUBTREE_DEPTH_CTE: &str = "WITH RECURSIVE subtree(id, depth) AS (
        SELECT ?1, 0
        UNION ALL
        SELECT t.id, s.depth + 1 FROM todos t INNER JOIN subtree s ON t.parent_id = s.id
        WHERE s.depth < 10000
    )";

/// Ids of `root` and all of its descendants, breadth-first: every id precedes its descendants.
pub(crate) fn subtree_ids(conn: &Connection, root: &str) -> Result<Vec<String>> {
    let sql = format!("{} SELECT id FROM subtree", SUBTREE_CTE);
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params![root], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Levels below `root` in its subtree (0 for a leaf).
pub(crate) fn subtree_height(conn: &Connection, root: &str) -> Result<usize> {
    let sql = format!("{} SELECT MAX(depth) FROM subtree", SUBTREE_DEPTH_CTE);
    let height: Option<i64> = conn.query_row(&sql, params![root], |row| row.get(0))?;
    Ok(height.unwrap_or(0).max(0) as usize)
}

/// Ancestors of `todo_id`, nearest first. Stops if a link repeats.
pub(crate) fn ancestor_ids(conn: &Connection, todo_id: &str) -> Result<Vec<String>> {
    let mut ancestors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(todo_id.to_string());

    let mut stmt = conn.prepare("SELECT parent_id FROM todos WHERE id = ?1")?;
    let mut current = todo_id.to_string();

    loop {
        let parent: Option<Option<String>> =
            super::optional(stmt.query_row(params![&current], |row| row.get(0)))?;
        match parent.flatten() {
            Some(pid) if seen.insert(pid.clone()) => {
                ancestors.push(pid.clone());
                current = pid;
            }
            _ => break,
        }
    }

    Ok(ancestors)
}

/// Depth of a todo: 0 for a top-level todo, 1 for its children, and so on.
pub(crate) fn depth_of(conn: &Connection, todo_id: &str) -> Result<usize> {
    Ok(ancestor_ids(conn, todo_id)?.len())
}

/// True if making `new_parent_id` the parent of `todo_id` would close a loop.
pub(crate) fn would_create_cycle(
    conn: &Connection,
    todo_id: &str,
    new_parent_id: &str,
) -> Result<bool> {
    if todo_id == new_parent_id {
        return Ok(true);
    }
    Ok(ancestor_ids(conn, new_parent_id)?
        .iter()
        .any(|id| id == todo_id))
}

/// Reject placing a subtree of `height` extra levels under `parent_id` if that
/// would exceed `max_depth` (0 = unlimited).
pub(crate) fn check_depth(
    conn: &Connection,
    parent_id: &str,
    height: usize,
    max_depth: usize,
) -> Result<()> {
    if max_depth == 0 {
        return Ok(());
    }
    let parent_depth = depth_of(conn, parent_id)?;
    let deepest = parent_depth + 1 + height;
    if deepest > max_depth {
        return Err(ApiError::invalid_value(
            "parent_id",
            format!(
                "Maximum subtask depth of {} exceeded. Parent is already at depth {}.",
                max_depth, parent_depth
            ),
        )
        .into());
    }
    Ok(())
}

/// Deepest subtask level embedded in a view, counted from the requested todo.
///
/// Todos below this level are still counted on their parent and can be fetched
/// on their own; the cap keeps the nested response bounded however deep the tree.
pub const VIEW_NESTING_LIMIT: usize = 32;

/// Subtree rows with their depth, breadth-first, siblings in creation order.
/// Goes one level past the embedding cap so the last embedded level still
/// reports its child counts.
const VIEW_SUBTREE_SQL: &str = "WITH RECURSIVE subtree(id, depth) AS (
        SELECT ?1, 0
        UNION ALL
        SELECT t.id, s.depth + 1 FROM todos t INNER JOIN subtree s ON t.parent_id = s.id
        WHERE s.depth < ?2
    )
    SELECT t.*, s.depth AS depth FROM subtree s INNER JOIN todos t ON t.id = s.id
    WHERE s.depth > 0
    ORDER BY s.depth, t.created_at, t.rowid";

struct Node {
    todo: Option<Todo>,
    depth: usize,
    completed: bool,
    children: Vec<usize>,
}

/// Resolve relationships and the subtree of `todo`, nested up to
/// [`VIEW_NESTING_LIMIT`] levels.
///
/// The subtree is fetched in one query and assembled bottom-up, so tree depth
/// never turns into call depth.
pub(crate) fn load_view(conn: &Connection, todo: Todo) -> Result<TodoView> {
    let fetch_depth = (VIEW_NESTING_LIMIT + 1) as i64;
    let mut stmt = conn.prepare(VIEW_SUBTREE_SQL)?;
    let rows = stmt
        .query_map(params![&todo.id, fetch_depth], |row| {
            let depth: i64 = row.get("depth")?;
            Ok((parse_todo_row(row)?, depth.max(0) as usize))
        })?
        .collect::<rusqlite::Result<Vec<(Todo, usize)>>>()?;

    let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len() + 1);
    index.insert(todo.id.clone(), 0);
    let mut nodes = vec![Node {
        completed: todo.completed,
        todo: Some(todo),
        depth: 0,
        children: Vec::new(),
    }];

    // Rows arrive shallowest first, so a parent is always indexed before its
    // children. A repeated id only shows up with corrupt parent links.
    for (child, depth) in rows {
        if index.contains_key(&child.id) {
            continue;
        }
        let Some(parent) = child.parent_id.as_deref().and_then(|pid| index.get(pid).copied())
        else {
            continue;
        };
        let slot = nodes.len();
        index.insert(child.id.clone(), slot);
        nodes[parent].children.push(slot);
        nodes.push(Node {
            completed: child.completed,
            todo: Some(child),
            depth,
            children: Vec::new(),
        });
    }

    // Children always sit after their parent, so walking backwards finishes
    // every child view before the parent that embeds it.
    let mut built: Vec<Option<TodoView>> = Vec::with_capacity(nodes.len());
    built.resize_with(nodes.len(), || None);

    for slot in (0..nodes.len()).rev() {
        if nodes[slot].depth > VIEW_NESTING_LIMIT {
            continue;
        }
        let Some(todo) = nodes[slot].todo.take() else {
            continue;
        };

        let children = &nodes[slot].children;
        let subtask_count = children.len();
        let completed_subtask_count = children.iter().filter(|&&c| nodes[c].completed).count();
        let subtasks: Vec<TodoView> = children.iter().filter_map(|&c| built[c].take()).collect();

        built[slot] = Some(resolve_relations(
            conn,
            todo,
            subtasks,
            subtask_count,
            completed_subtask_count,
        )?);
    }

    built
        .first_mut()
        .and_then(Option::take)
        .ok_or_else(|| anyhow::anyhow!("subtree view lost its root"))
}

fn resolve_relations(
    conn: &Connection,
    todo: Todo,
    subtasks: Vec<TodoView>,
    subtask_count: usize,
    completed_subtask_count: usize,
) -> Result<TodoView> {
    let category = match todo.category_id.as_deref() {
        Some(cid) => get_category_internal(conn, cid)?,
        None => None,
    };
    let tags = tags_for_todo(conn, &todo.id)?;
    let attachments = attachments_for_todo(conn, &todo.id)?;

    Ok(TodoView {
        todo,
        category,
        tags,
        attachments,
        subtasks,
        subtask_count,
        completed_subtask_count,
    })
}

impl Database {
    /// Get a todo with category, tags, attachments and all subtasks resolved.
    pub fn get_todo_view(&self, todo_id: &str) -> Result<Option<TodoView>> {
        self.with_conn(|conn| match get_todo_internal(conn, todo_id)? {
            Some(todo) => Ok(Some(load_view(conn, todo)?)),
            None => Ok(None),
        })
    }

    /// Ids of all descendants of a todo (excluding the todo itself).
    pub fn get_descendant_ids(&self, todo_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut ids = subtree_ids(conn, todo_id)?;
            ids.retain(|id| id != todo_id);
            Ok(ids)
        })
    }

    /// Nesting depth of a todo (0 = top level).
    pub fn get_depth(&self, todo_id: &str) -> Result<usize> {
        self.with_conn(|conn| depth_of(conn, todo_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewTodo;

    /// Insert a straight chain of `levels` subtasks under a new top-level todo.
    fn insert_chain(db: &Database, levels: usize) -> (String, String) {
        let root = db.create_todo(NewTodo::titled("chain root")).unwrap().todo.id;
        let leaf = db
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;
                let mut parent = root.clone();
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO todos (id, title, priority, completed, parent_id, created_at, updated_at)
                         VALUES (?1, ?2, 5, 0, ?3, 0, 0)",
                    )?;
                    for level in 1..=levels {
                        let id = format!("chain-{level}");
                        stmt.execute(params![&id, format!("level {level}"), &parent])?;
                        parent = id;
                    }
                }
                tx.commit()?;
                Ok(parent)
            })
            .unwrap();
        (root, leaf)
    }

    fn nesting_depth(view: &TodoView) -> usize {
        let mut depth = 0;
        let mut current = view;
        while let Some(next) = current.subtasks.first() {
            depth += 1;
            current = next;
        }
        depth
    }

    #[test]
    fn deep_chain_view_is_capped() {
        let db = Database::open_in_memory().unwrap().with_max_subtask_depth(0);
        let (root, leaf) = insert_chain(&db, 5000);

        let view = db.get_todo_view(&root).unwrap().unwrap();
        assert_eq!(nesting_depth(&view), VIEW_NESTING_LIMIT);
        assert_eq!(view.subtask_count, 1);

        let mut deepest = &view;
        while let Some(next) = deepest.subtasks.first() {
            deepest = next;
        }
        assert!(deepest.subtasks.is_empty());
        assert_eq!(deepest.subtask_count, 1);
        assert_eq!(deepest.todo.id, format!("chain-{VIEW_NESTING_LIMIT}"));

        assert!(serde_json::to_string(&view).is_ok());
        assert_eq!(db.get_depth(&leaf).unwrap(), 5000);

        let leaf_view = db.get_todo_view(&leaf).unwrap().unwrap();
        assert_eq!(leaf_view.subtask_count, 0);
    }

    #[test]
    fn deep_chain_deletes_leaves_first() {
        let db = Database::open_in_memory().unwrap().with_max_subtask_depth(0);
        let (root, _) = insert_chain(&db, 3000);

        let summary = db.delete_todo(&root).unwrap();
        assert_eq!(summary.todos_deleted, 3001);
        assert_eq!(db.count_todos().unwrap(), 0);
    }

    #[test]
    fn view_counts_direct_children_only() {
        let db = Database::open_in_memory().unwrap();
        let root = db.create_todo(NewTodo::titled("root")).unwrap().todo.id;
        let first = db.add_subtask(&root, NewTodo::titled("first")).unwrap().todo.id;
        let second = db.add_subtask(&root, NewTodo::titled("second")).unwrap().todo.id;
        db.add_subtask(&first, NewTodo::titled("grandchild")).unwrap();
        db.set_completed(&second, true).unwrap();

        let view = db.get_todo_view(&root).unwrap().unwrap();
        assert_eq!(view.subtask_count, 2);
        assert_eq!(view.completed_subtask_count, 1);
        let titles: Vec<&str> = view.subtasks.iter().map(|s| s.todo.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(view.subtasks[0].subtask_count, 1);
        assert_eq!(view.subtasks[0].subtasks[0].todo.title, "grandchild");
    }
}
