//! Database layer for the todo tracker.

pub mod attachments;
pub mod categories;
pub mod priorities;
pub mod query;
pub mod tags;
pub mod todos;
pub mod tree;

use crate::cache::PriorityCache;
use crate::types::DEFAULT_MAX_SUBTASK_DEPTH;
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    priorities: Arc<PriorityCache>,
    /// Deepest allowed subtask level (root todos are depth 0). 0 = unlimited.
    max_subtask_depth: usize,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a write transaction is open
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            priorities: Arc::new(PriorityCache::default()),
            max_subtask_depth: DEFAULT_MAX_SUBTASK_DEPTH,
        };

        db.run_migrations()?;
        db.seed_priority_levels()?;

        Ok(db)
    }

    /// Limit how deep subtasks may nest. 0 disables the limit.
    pub fn with_max_subtask_depth(mut self, depth: usize) -> Self {
        self.max_subtask_depth = depth;
        self
    }

    pub fn max_subtask_depth(&self) -> usize {
        self.max_subtask_depth
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        self.with_conn_mut(|conn| {
            let report = embedded::migrations::runner().run(conn)?;
            for migration in report.applied_migrations() {
                tracing::info!("Applied migration {}", migration);
            }
            Ok(())
        })
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?;
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for transactions).
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?;
        f(&mut conn)
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// True if the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Map `QueryReturnedNoRows` to `None`.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let db = Database::open_in_memory().unwrap();
        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .unwrap();

        for expected in ["attachments", "categories", "priority_levels", "tags", "todo_tags", "todos"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[test]
    fn open_file_database_twice_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todos.db");

        {
            let db = Database::open(&path).unwrap();
            db.create_todo(crate::types::NewTodo::titled("persist me")).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_todos().unwrap(), 1);
        assert_eq!(db.list_priorities().unwrap().len(), 10);
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
