use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ExpansionConfig;
use crate::database::schema::{initialize_schema, run_migrations};
use crate::error::DatabaseError;
use crate::logging::MetricsLogger;
use crate::traversal::TraversalReport;

/// Session listing entry, without the stored graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub name: Option<String>,
    pub seeds: Vec<String>,
    pub node_count: u64,
    pub edge_count: u64,
    pub skipped_count: u64,
    pub pending_count: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A saved exploration with everything needed to resume it
#[derive(Debug, Clone)]
pub struct Session {
    pub summary: SessionSummary,
    pub expansion: ExpansionConfig,
    pub report: TraversalReport,
}

/// SQLite-backed session store
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const SUMMARY_COLUMNS: &str =
    "id, name, seeds, node_count, edge_count, skipped_count, pending_count, created_at, updated_at";

impl Database {
    /// Open (or create) the database file and initialize the schema
    pub fn new(db_path: &str) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path)?;
        initialize_schema(&conn)?;
        run_migrations(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database for testing
    pub fn new_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        run_migrations(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::Lock("Failed to acquire lock".to_string()))
    }

    /// Store a finished traversal; returns the new session id
    pub fn save_session(
        &self,
        name: Option<&str>,
        seeds: &[String],
        expansion: &ExpansionConfig,
        report: &TraversalReport,
    ) -> Result<i64, DatabaseError> {
        let seeds_json = serde_json::to_string(seeds)?;
        let expansion_json = serde_json::to_string(expansion)?;
        let report_json = serde_json::to_string(report)?;
        let now = chrono::Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (name, seeds, expansion, report, node_count, edge_count,
                                   skipped_count, pending_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                name,
                seeds_json,
                expansion_json,
                report_json,
                report.graph.node_count() as i64,
                report.graph.edge_count() as i64,
                report.skipped.len() as i64,
                report.pending.len() as i64,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();

        MetricsLogger::log_session_saved(id, report.graph.node_count(), report.graph.edge_count());
        Ok(id)
    }

    /// Replace a session's report, e.g. after resuming it
    pub fn update_session(&self, id: i64, report: &TraversalReport) -> Result<(), DatabaseError> {
        let report_json = serde_json::to_string(report)?;
        let now = chrono::Utc::now().timestamp();

        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE sessions
             SET report = ?1, node_count = ?2, edge_count = ?3, skipped_count = ?4,
                 pending_count = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                report_json,
                report.graph.node_count() as i64,
                report.graph.edge_count() as i64,
                report.skipped.len() as i64,
                report.pending.len() as i64,
                now,
                id,
            ],
        )?;

        if updated == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        MetricsLogger::log_session_saved(id, report.graph.node_count(), report.graph.edge_count());
        Ok(())
    }

    pub fn get_session(&self, id: i64) -> Result<Session, DatabaseError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {}, expansion, report FROM sessions WHERE id = ?1", SUMMARY_COLUMNS),
                params![id],
                |row| {
                    let summary = summary_from_row(row)?;
                    let expansion: String = row.get(9)?;
                    let report: String = row.get(10)?;
                    Ok((summary, expansion, report))
                },
            )
            .optional()?;

        let Some((summary, expansion, report)) = row else {
            return Err(DatabaseError::NotFound(id));
        };

        Ok(Session {
            summary: summary?,
            expansion: serde_json::from_str(&expansion)?,
            report: serde_json::from_str(&report)?,
        })
    }

    /// All sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY created_at DESC, id DESC",
            SUMMARY_COLUMNS
        ))?;

        let rows = stmt.query_map([], summary_from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row??);
        }
        Ok(sessions)
    }

    pub fn delete_session(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        Ok(())
    }

    pub fn session_count(&self) -> Result<u64, DatabaseError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Cheap connectivity probe for health checks
    pub fn health_check(&self) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

/// The seeds column is JSON, so decoding can fail independently of SQLite
fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<Result<SessionSummary, DatabaseError>> {
    let seeds: String = row.get(2)?;
    let summary = SessionSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        seeds: Vec::new(),
        node_count: row.get::<_, i64>(3)? as u64,
        edge_count: row.get::<_, i64>(4)? as u64,
        skipped_count: row.get::<_, i64>(5)? as u64,
        pending_count: row.get::<_, i64>(6)? as u64,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    };

    Ok(serde_json::from_str(&seeds)
        .map(|seeds| SessionSummary { seeds, ..summary })
        .map_err(DatabaseError::from))
}
