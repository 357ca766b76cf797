//! SQLite-backed audit store.
//!
//! Events live in one `audit_events` table next to the job and ticket
//! tables. The event itself is stored as JSON; the columns copied out of it
//! exist only for filtering.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ToSql};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL,
    ticket_id TEXT,
    job_id TEXT,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_events_ticket_id ON audit_events(ticket_id);
CREATE INDEX IF NOT EXISTS idx_audit_events_job_id ON audit_events(job_id);
CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
"#;

fn db_err(e: rusqlite::Error) -> AuditError {
    AuditError::Database(e.to_string())
}

/// A WHERE clause and its positional parameters.
struct Conditions {
    clause: String,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    fn from_filter(filter: &AuditFilter) -> Self {
        let mut terms = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        let columns = [
            ("ticket_id", &filter.ticket_id),
            ("job_id", &filter.job_id),
            ("event_type", &filter.event_type),
        ];
        for (column, value) in columns {
            if let Some(value) = value {
                terms.push(format!("{} = ?", column));
                params.push(Box::new(value.clone()));
            }
        }
        if let Some(from) = filter.from {
            terms.push("timestamp >= ?".to_string());
            params.push(Box::new(from.to_rfc3339()));
        }
        if let Some(to) = filter.to {
            terms.push("timestamp <= ?".to_string());
            params.push(Box::new(to.to_rfc3339()));
        }

        let clause = if terms.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", terms.join(" AND "))
        };
        Self { clause, params }
    }

    fn refs(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

/// Row as stored, before the timestamp and event are decoded.
struct StoredRow {
    id: i64,
    timestamp: String,
    event_type: String,
    ticket_id: Option<String>,
    job_id: Option<String>,
    data: String,
}

impl StoredRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            event_type: row.get(2)?,
            ticket_id: row.get(3)?,
            job_id: row.get(4)?,
            data: row.get(5)?,
        })
    }

    fn decode(self) -> Result<AuditRecord, AuditError> {
        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| AuditError::Database(format!("Invalid timestamp: {}", e)))?
            .into();
        let data: AuditEvent = serde_json::from_str(&self.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        Ok(AuditRecord {
            id: self.id,
            timestamp,
            event_type: self.event_type,
            ticket_id: self.ticket_id,
            job_id: self.job_id,
            data,
        })
    }
}

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) the audit tables in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::with_connection(Connection::open(path).map_err(db_err)?)
    }

    /// Create an in-memory SQLite audit store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Database("connection lock poisoned".to_string()))
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, ticket_id, job_id, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.ticket_id,
                record.job_id,
                data,
            ],
        )
        .map_err(db_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let mut conditions = Conditions::from_filter(filter);
        conditions.params.push(Box::new(filter.limit));
        conditions.params.push(Box::new(filter.offset));
        let sql = format!(
            "SELECT id, timestamp, event_type, ticket_id, job_id, data FROM audit_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            conditions.clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(conditions.refs().as_slice(), StoredRow::read)
            .map_err(db_err)?;

        let records: Result<Vec<_>, _> = rows.map(|row| row.map_err(db_err)?.decode()).collect();
        records
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conditions = Conditions::from_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", conditions.clause);

        self.lock()?
            .query_row(&sql, conditions.refs().as_slice(), |row| row.get(0))
            .map_err(db_err)
    }
}
