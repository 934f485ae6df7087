use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DispatchError;
use crate::incident::{Incident, Responder};
use crate::store::StateStore;

fn storage_err(err: impl ToString) -> DispatchError {
    DispatchError::Storage(err.to_string())
}

/// Write-through SQLite mirror of the dispatch state, with the field sets
/// of the reference schema: `incidents`, `responders`, `deployed_resources`.
#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
}

impl SqliteStore {
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
            CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY,
                incident_type TEXT NOT NULL,
                category TEXT NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                location TEXT NOT NULL,
                description TEXT NOT NULL,
                reporter_id TEXT NOT NULL,
                responder_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS responders (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                active_incidents INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS deployed_resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL,
                resource_type TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                deployed_at TEXT NOT NULL,
                returned_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_deployed_incident
                ON deployed_resources(incident_id);
            ",
        )
        .map_err(storage_err)?;

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    fn connect(&self) -> Result<Connection, DispatchError> {
        Connection::open(&*self.db_path).map_err(storage_err)
    }

    fn write_incident(&self, incident: &Incident) -> Result<(), DispatchError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO incidents
                (id, incident_type, category, priority, status, location,
                 description, reporter_id, responder_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                incident.id,
                incident.incident_type,
                incident.category.as_str(),
                incident.priority.code(),
                incident.status.as_str(),
                incident.location,
                incident.description,
                incident.reporter_id,
                incident.responder_id,
                incident.created_at.to_rfc3339(),
                incident.updated_at.to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub fn incident_status(&self, id: i64) -> Result<Option<String>, DispatchError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT status FROM incidents WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(storage_err)
    }

    pub fn responder_load(&self, id: &str) -> Result<Option<(String, u32)>, DispatchError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT status, active_incidents FROM responders WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
        )
        .optional()
        .map_err(storage_err)
    }

    pub fn outstanding_deployments(&self, incident_id: i64) -> Result<u32, DispatchError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM deployed_resources
             WHERE incident_id = ?1 AND returned_at IS NULL",
            params![incident_id],
            |row| row.get::<_, u32>(0),
        )
        .map_err(storage_err)
    }
}

impl StateStore for SqliteStore {
    fn create_incident(&self, incident: &Incident) -> Result<(), DispatchError> {
        self.write_incident(incident)
    }

    fn update_incident(&self, incident: &Incident) -> Result<(), DispatchError> {
        self.write_incident(incident)
    }

    fn upsert_responder(&self, responder: &Responder) -> Result<(), DispatchError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO responders
                (id, name, category, status, active_incidents)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                responder.id,
                responder.name,
                responder.category.as_str(),
                responder.status.as_str(),
                responder.active_incidents,
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn record_deployment(
        &self,
        incident_id: i64,
        resource_type: &str,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO deployed_resources
                (incident_id, resource_type, quantity, deployed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                incident_id,
                resource_type,
                quantity,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn record_return(
        &self,
        incident_id: i64,
        resource_type: &str,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, quantity FROM deployed_resources
                 WHERE incident_id = ?1 AND resource_type = ?2 AND returned_at IS NULL
                 ORDER BY id ASC",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![incident_id, resource_type], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?))
            })
            .map_err(storage_err)?;

        let mut outstanding = Vec::new();
        for row in rows {
            outstanding.push(row.map_err(storage_err)?);
        }
        drop(stmt);

        let now = Utc::now().to_rfc3339();
        let mut remaining = quantity;
        for (row_id, row_quantity) in outstanding {
            if remaining == 0 {
                break;
            }
            if row_quantity <= remaining {
                conn.execute(
                    "UPDATE deployed_resources SET returned_at = ?1 WHERE id = ?2",
                    params![now, row_id],
                )
                .map_err(storage_err)?;
                remaining -= row_quantity;
            } else {
                // Shrink the open row and record the returned part on its own.
                conn.execute(
                    "UPDATE deployed_resources SET quantity = quantity - ?1 WHERE id = ?2",
                    params![remaining, row_id],
                )
                .map_err(storage_err)?;
                conn.execute(
                    "INSERT INTO deployed_resources
                        (incident_id, resource_type, quantity, deployed_at, returned_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![incident_id, resource_type, remaining, now],
                )
                .map_err(storage_err)?;
                remaining = 0;
            }
        }
        if remaining > 0 {
            return Err(DispatchError::Storage(format!(
                "incident {incident_id} has no outstanding '{resource_type}' rows for {remaining} units"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{IncidentFacts, IncidentStatus};
    use dispatch_catalog::{Category, Priority};

    fn db_path(name: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        format!("/tmp/dispatch-core-tests/{name}-{nanos}.db")
    }

    fn incident(id: i64, status: IncidentStatus) -> Incident {
        let now = Utc::now();
        Incident {
            id,
            incident_type: "structure_fire".into(),
            category: Category::Fire,
            priority: Priority::Critical,
            status,
            location: "old mill".into(),
            description: "smoke visible".into(),
            reporter_id: "rep-1".into(),
            responder_id: None,
            facts: IncidentFacts::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn incident_writes_are_upserts() {
        let store = SqliteStore::open(&db_path("incidents")).expect("open");
        store
            .create_incident(&incident(1, IncidentStatus::Pending))
            .expect("create");
        store
            .update_incident(&incident(1, IncidentStatus::Ongoing))
            .expect("update");

        let status = store.incident_status(1).expect("query").expect("row");
        assert_eq!(status, "ongoing");
    }

    #[test]
    fn responder_upsert_tracks_load() {
        let store = SqliteStore::open(&db_path("responders")).expect("open");
        let mut responder = Responder::new("resp-1", "Avery", Category::Fire);
        store.upsert_responder(&responder).expect("insert");

        responder.active_incidents = 2;
        responder.status = crate::incident::ResponderStatus::Busy;
        store.upsert_responder(&responder).expect("update");

        let (status, load) = store
            .responder_load("resp-1")
            .expect("query")
            .expect("row");
        assert_eq!(status, "busy");
        assert_eq!(load, 2);
    }

    #[test]
    fn returns_close_deployment_rows_fifo() {
        let store = SqliteStore::open(&db_path("deployments")).expect("open");
        store.record_deployment(1, "ambulances", 2).expect("deploy");
        store.record_deployment(1, "ambulances", 1).expect("deploy");
        assert_eq!(store.outstanding_deployments(1).expect("sum"), 3);

        store.record_return(1, "ambulances", 2).expect("partial return");
        assert_eq!(store.outstanding_deployments(1).expect("sum"), 1);

        store.record_return(1, "ambulances", 1).expect("final return");
        assert_eq!(store.outstanding_deployments(1).expect("sum"), 0);
    }

    #[test]
    fn return_without_outstanding_rows_fails() {
        let store = SqliteStore::open(&db_path("empty-return")).expect("open");
        assert!(store.record_return(1, "ambulances", 1).is_err());
    }
}
