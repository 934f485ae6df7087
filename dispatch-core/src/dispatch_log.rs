use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DispatchError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    IncidentReported,
    PriorityRaised,
    ResponderAssigned,
    ResourceDeployed,
    ResourceShortfall,
    ResourceReturned,
    IncidentResolved,
}

/// One entry in the append-only dispatch trail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchAction {
    pub id: Option<i64>,
    pub incident_id: i64,
    pub category: String,
    pub kind: ActionKind,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

/// Append-only record of responder actions and priority/resource decisions,
/// keyed by incident id. Reads serve reporting; nothing here is ever
/// updated or deleted.
#[derive(Clone)]
pub struct DispatchLog {
    db_path: Arc<PathBuf>,
}

fn storage_err(err: impl ToString) -> DispatchError {
    DispatchError::Storage(err.to_string())
}

impl DispatchLog {
    pub fn open(path: &str) -> Result<Self, DispatchError> {
        let db_path = PathBuf::from(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(storage_err)?;
            }
        }

        let conn = Connection::open(&db_path).map_err(storage_err)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                details TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_actions_incident ON actions(incident_id);
            CREATE INDEX IF NOT EXISTS idx_actions_ts ON actions(timestamp);
            ",
        )
        .map_err(storage_err)?;

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    pub fn append(&self, action: &DispatchAction) -> Result<i64, DispatchError> {
        let conn = Connection::open(&*self.db_path).map_err(storage_err)?;
        let kind = serde_json::to_string(&action.kind).map_err(storage_err)?;
        let details = action
            .details
            .as_ref()
            .map(|d| serde_json::to_string(d).map_err(storage_err))
            .transpose()?;

        conn.execute(
            "INSERT INTO actions (incident_id, category, kind, description, details, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                action.incident_id,
                action.category,
                kind,
                action.description,
                details,
                action.timestamp,
            ],
        )
        .map_err(storage_err)?;

        Ok(conn.last_insert_rowid())
    }

    pub fn actions_for(&self, incident_id: i64) -> Result<Vec<DispatchAction>, DispatchError> {
        let conn = Connection::open(&*self.db_path).map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, incident_id, category, kind, description, details, timestamp
                 FROM actions
                 WHERE incident_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(storage_err)?;

        let rows = stmt
            .query_map(params![incident_id], map_row)
            .map_err(storage_err)?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row.map_err(storage_err)?);
        }
        Ok(actions)
    }

    /// Most recent `limit` actions, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<DispatchAction>, DispatchError> {
        let conn = Connection::open(&*self.db_path).map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, incident_id, category, kind, description, details, timestamp
                 FROM actions
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(storage_err)?;

        let rows = stmt
            .query_map(params![limit as i64], map_row)
            .map_err(storage_err)?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row.map_err(storage_err)?);
        }
        Ok(actions)
    }

    pub fn counts_by_category(&self) -> Result<BTreeMap<String, i64>, DispatchError> {
        let conn = Connection::open(&*self.db_path).map_err(storage_err)?;
        let mut stmt = conn
            .prepare("SELECT category, COUNT(*) FROM actions GROUP BY category")
            .map_err(storage_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(storage_err)?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (category, count) = row.map_err(storage_err)?;
            out.insert(category, count);
        }
        Ok(out)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DispatchAction> {
    let kind_str: String = row.get(3)?;
    let details_str: Option<String> = row.get(5)?;

    let kind: ActionKind = serde_json::from_str(&kind_str).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(err))
    })?;

    let details = details_str
        .map(|s| {
            serde_json::from_str(&s).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
            })
        })
        .transpose()?;

    Ok(DispatchAction {
        id: row.get(0)?,
        incident_id: row.get(1)?,
        category: row.get(2)?,
        kind,
        description: row.get(4)?,
        details,
        timestamp: row.get(6)?,
    })
}
