//! Durable build history, one row per commit.
//!
//! SQLite work is synchronous, so every call runs on tokio's blocking pool
//! while holding the connection mutex. Each statement is its own implicit
//! transaction, so readers never observe a half-written row.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::CiError;
use crate::models::build::BuildRecord;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS build_history (
        commit_id TEXT PRIMARY KEY,
        build_date TEXT NOT NULL,
        build_logs TEXT NOT NULL
    );
";

#[derive(Clone)]
pub struct BuildHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl BuildHistoryStore {
    /// Open (or create) the database at `path` and ensure the table exists.
    pub fn open(path: &Path) -> Result<Self, CiError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(
                "SQLite kept journal_mode '{}' for {}",
                journal_mode,
                path.display()
            );
        }
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CiError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CiError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<F, R>(&self, f: F) -> Result<R, CiError>
    where
        F: FnOnce(&Connection) -> Result<R, CiError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| CiError::Persist(format!("connection lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| CiError::Persist(format!("database task failed: {}", e)))?
    }

    /// Record a build. A commit that is already recorded is rejected with
    /// `CiError::DuplicateCommit` and the existing row is left untouched.
    pub async fn insert(
        &self,
        commit_id: &str,
        build_date: &str,
        build_logs: &str,
    ) -> Result<(), CiError> {
        let record = BuildRecord {
            commit_id: commit_id.to_string(),
            build_date: build_date.to_string(),
            build_logs: build_logs.to_string(),
        };
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO build_history (commit_id, build_date, build_logs) VALUES (?1, ?2, ?3)",
                params![record.commit_id, record.build_date, record.build_logs],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    CiError::DuplicateCommit(record.commit_id.clone())
                }
                other => CiError::from(other),
            })?;
            Ok(())
        })
        .await
    }

    /// Exact-match lookup; `None` when no build was recorded for the commit.
    pub async fn get_by_commit_id(&self, commit_id: &str) -> Result<Option<BuildRecord>, CiError> {
        let commit_id = commit_id.to_string();
        self.call(move |conn| {
            let record = conn
                .query_row(
                    "SELECT commit_id, build_date, build_logs FROM build_history WHERE commit_id = ?1",
                    params![commit_id],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    /// Every recorded build, newest first.
    pub async fn get_all(&self) -> Result<Vec<BuildRecord>, CiError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT commit_id, build_date, build_logs FROM build_history
                 ORDER BY build_date DESC, rowid DESC",
            )?;
            let rows = stmt.query_map([], row_to_record)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<BuildRecord> {
    Ok(BuildRecord {
        commit_id: row.get(0)?,
        build_date: row.get(1)?,
        build_logs: row.get(2)?,
    })
}
