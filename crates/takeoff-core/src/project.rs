//! Projects and the version ledger, with a SQLite-backed store.

use crate::error::{Result, TakeoffError};
use crate::ledger::LedgerEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Attached once a takeoff spreadsheet exists.
    pub spreadsheet_id: Option<String>,
    pub status: String,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            spreadsheet_id: None,
            status: "Active".to_string(),
        }
    }
}

/// A partial update to a project. Only these fields can change, each bound
/// to one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    /// An empty string detaches the spreadsheet.
    pub spreadsheet_id: Option<String>,
    pub status: Option<String>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.spreadsheet_id.is_none() && self.status.is_none()
    }

    /// `(column, value)` pairs for the fields that are set.
    pub fn assignments(&self) -> Vec<(&'static str, Option<String>)> {
        let mut out = Vec::new();
        if let Some(name) = &self.name {
            out.push(("project_name", Some(name.trim().to_string())));
        }
        if let Some(id) = &self.spreadsheet_id {
            let id = id.trim();
            out.push((
                "takeoff_spreadsheet_id",
                (!id.is_empty()).then(|| id.to_string()),
            ));
        }
        if let Some(status) = &self.status {
            out.push(("status", Some(status.trim().to_string())));
        }
        out
    }
}

/// A row of the version ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub project_id: String,
    pub sheet_name: String,
    pub created_at: DateTime<Utc>,
    pub items_count: u32,
    pub locations_count: u32,
    pub status: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied_from: Option<String>,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, id: &str) -> Result<Option<Project>>;
}

#[async_trait]
pub trait VersionLedger: Send + Sync {
    async fn apply(&self, event: &LedgerEvent) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SqliteProjectStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS project_folders (
    id                     TEXT PRIMARY KEY,
    project_name           TEXT NOT NULL,
    takeoff_spreadsheet_id TEXT,
    status                 TEXT NOT NULL DEFAULT 'Active',
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS project_versions (
    id              TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL,
    sheet_name      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    items_count     INTEGER NOT NULL DEFAULT 0,
    locations_count INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL,
    is_active       INTEGER NOT NULL DEFAULT 0,
    copied_from     TEXT,
    UNIQUE (project_id, sheet_name)
);
";

#[derive(Clone)]
pub struct SqliteProjectStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProjectStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_project(&self, project: &Project) -> Result<()> {
        if project.id.trim().is_empty() {
            return Err(TakeoffError::Invalid("project id must not be empty".into()));
        }
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO project_folders
                (id, project_name, takeoff_spreadsheet_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                project.id,
                project.name,
                project.spreadsheet_id,
                project.status,
                now
            ],
        )?;
        Ok(())
    }

    pub fn find_project(&self, id: &str) -> Result<Option<Project>> {
        let project = self
            .conn()
            .query_row(
                "SELECT id, project_name, takeoff_spreadsheet_id, status
                 FROM project_folders WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        spreadsheet_id: row.get(2)?,
                        status: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_name, takeoff_spreadsheet_id, status
             FROM project_folders ORDER BY project_name, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
                spreadsheet_id: row.get(2)?,
                status: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Apply `patch` and return the updated project.
    pub fn apply_patch(&self, id: &str, patch: &ProjectPatch) -> Result<Project> {
        let assignments = patch.assignments();
        if assignments.is_empty() {
            return Err(TakeoffError::Invalid("nothing to update".into()));
        }
        let mut sets: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let n = assignments.len();
        sets.push(format!("updated_at = ?{}", n + 1));
        let sql = format!(
            "UPDATE project_folders SET {} WHERE id = ?{}",
            sets.join(", "),
            n + 2
        );
        let mut values: Vec<Option<String>> = assignments.into_iter().map(|(_, v)| v).collect();
        values.push(Some(Utc::now().to_rfc3339()));
        values.push(Some(id.to_string()));

        let changed = self.conn().execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(TakeoffError::ProjectNotFound(id.to_string()));
        }
        self.find_project(id)?
            .ok_or_else(|| TakeoffError::ProjectNotFound(id.to_string()))
    }

    pub fn versions_for(&self, project_id: &str) -> Result<Vec<VersionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT project_id, sheet_name, created_at, items_count, locations_count,
                    status, is_active, copied_from
             FROM project_versions WHERE project_id = ?1 ORDER BY created_at, sheet_name",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(VersionRecord {
                project_id: row.get(0)?,
                sheet_name: row.get(1)?,
                created_at: row.get(2)?,
                items_count: row.get(3)?,
                locations_count: row.get(4)?,
                status: row.get(5)?,
                is_active: row.get(6)?,
                copied_from: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn record_event(&self, event: &LedgerEvent) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        match event {
            LedgerEvent::VersionCreated(r) => {
                if r.is_active {
                    tx.execute(
                        "UPDATE project_versions SET is_active = 0 WHERE project_id = ?1",
                        params![r.project_id],
                    )?;
                }
                tx.execute(
                    "INSERT INTO project_versions
                        (id, project_id, sheet_name, created_at, items_count, locations_count,
                         status, is_active, copied_from)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT (project_id, sheet_name) DO UPDATE SET
                        created_at = excluded.created_at,
                        items_count = excluded.items_count,
                        locations_count = excluded.locations_count,
                        status = excluded.status,
                        is_active = excluded.is_active,
                        copied_from = excluded.copied_from",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        r.project_id,
                        r.sheet_name,
                        r.created_at,
                        r.items_count,
                        r.locations_count,
                        r.status,
                        r.is_active,
                        r.copied_from
                    ],
                )?;
            }
            LedgerEvent::ActiveChanged {
                project_id,
                sheet_name,
            } => {
                tx.execute(
                    "UPDATE project_versions SET is_active = (sheet_name = ?2)
                     WHERE project_id = ?1",
                    params![project_id, sheet_name],
                )?;
            }
            LedgerEvent::StatusChanged {
                project_id,
                sheet_name,
                status,
            } => {
                tx.execute(
                    "UPDATE project_versions SET status = ?3
                     WHERE project_id = ?1 AND sheet_name = ?2",
                    params![project_id, sheet_name, status],
                )?;
            }
            LedgerEvent::VersionDeleted {
                project_id,
                sheet_name,
            } => {
                tx.execute(
                    "UPDATE project_versions SET status = 'Deleted', is_active = 0
                     WHERE project_id = ?1 AND sheet_name = ?2",
                    params![project_id, sheet_name],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

async fn blocking<T, F>(store: &SqliteProjectStore, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(SqliteProjectStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store))
        .await
        .map_err(|e| TakeoffError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let id = id.to_string();
        blocking(self, move |s| s.find_project(&id)).await
    }
}

#[async_trait]
impl VersionLedger for SqliteProjectStore {
    async fn apply(&self, event: &LedgerEvent) -> Result<()> {
        let event = event.clone();
        blocking(self, move |s| s.record_event(&event)).await
    }
}
