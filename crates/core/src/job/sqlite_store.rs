//! SQLite-backed job store implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::executor::StepOutput;
use crate::pipeline::StepName;

use super::{
    AttemptSettlement, Job, JobError, JobFilter, JobStatus, JobStore, StepAttempt, StepRecord,
    StepStatus,
};

/// SQLite-backed job store.
///
/// Jobs live in `jobs`, attempts in `step_attempts` keyed by
/// `(job_id, step, attempt)`. A partial unique index on `jobs(ticket_id)`
/// over non-terminal rows enforces one active job per ticket.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

struct JobRow {
    id: String,
    ticket_id: String,
    status: String,
    steps: String,
    cancel_requested: bool,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn db_err(e: impl std::fmt::Display) -> JobError {
    JobError::Database(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, JobError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobError::Database(format!("invalid timestamp {}: {}", value, e)))
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL,
                status TEXT NOT NULL,
                steps TEXT NOT NULL,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_ticket_id ON jobs(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_ticket
                ON jobs(ticket_id) WHERE status IN ('pending', 'running');

            CREATE TABLE IF NOT EXISTS step_attempts (
                job_id TEXT NOT NULL REFERENCES jobs(id),
                step TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                error_kind TEXT,
                output TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                PRIMARY KEY (job_id, step, attempt)
            );
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Database("connection lock poisoned".to_string()))
    }

    fn load_job(conn: &Connection, job_id: &str) -> Result<Option<Job>, JobError> {
        let row = conn
            .query_row(
                "SELECT id, ticket_id, status, steps, cancel_requested, error, created_at, updated_at FROM jobs WHERE id = ?",
                params![job_id],
                |row| {
                    Ok(JobRow {
                        id: row.get(0)?,
                        ticket_id: row.get(1)?,
                        status: row.get(2)?,
                        steps: row.get(3)?,
                        cancel_requested: row.get(4)?,
                        error: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let steps: Vec<StepName> = serde_json::from_str(&row.steps).map_err(db_err)?;
        let mut history = Self::load_attempts(conn, job_id)?;

        let records = steps
            .into_iter()
            .map(|step| StepRecord::from_history(step, history.remove(&step).unwrap_or_default()))
            .collect();

        Ok(Some(Job {
            id: row.id,
            ticket_id: row.ticket_id,
            status: row.status.parse().map_err(JobError::Database)?,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
            steps: records,
            cancel_requested: row.cancel_requested,
            error: row.error,
        }))
    }

    fn load_attempts(
        conn: &Connection,
        job_id: &str,
    ) -> Result<HashMap<StepName, Vec<StepAttempt>>, JobError> {
        let mut stmt = conn
            .prepare(
                "SELECT step, attempt, status, error, error_kind, output, started_at, finished_at FROM step_attempts WHERE job_id = ? ORDER BY step, attempt",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .map_err(db_err)?;

        let mut history: HashMap<StepName, Vec<StepAttempt>> = HashMap::new();
        for row in rows {
            let (step, attempt, status, error, error_kind, output, started_at, finished_at) =
                row.map_err(db_err)?;

            let step: StepName = step.parse().map_err(db_err)?;
            let output: Option<StepOutput> = output
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(db_err)?;

            history.entry(step).or_default().push(StepAttempt {
                attempt,
                status: status.parse().map_err(JobError::Database)?,
                error,
                error_kind,
                output,
                started_at: parse_time(&started_at)?,
                finished_at: finished_at.as_deref().map(parse_time).transpose()?,
            });
        }

        Ok(history)
    }

    fn require_job(conn: &Connection, job_id: &str) -> Result<Job, JobError> {
        Self::load_job(conn, job_id)?.ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    fn touch(conn: &Connection, job_id: &str, now: DateTime<Utc>) -> Result<(), JobError> {
        conn.execute(
            "UPDATE jobs SET updated_at = ? WHERE id = ?",
            params![now.to_rfc3339(), job_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(ref ticket_id) = filter.ticket_id {
            conditions.push("ticket_id = ?");
            params.push(Box::new(ticket_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, ticket_id: &str, steps: &[StepName]) -> Result<Job, JobError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let active: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs WHERE ticket_id = ? AND status IN ('pending', 'running') LIMIT 1",
                params![ticket_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        if let Some(job_id) = active {
            return Err(JobError::DuplicateSubmission {
                ticket_id: ticket_id.to_string(),
                job_id,
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let steps_json = serde_json::to_string(steps).map_err(db_err)?;

        let inserted = tx.execute(
            "INSERT INTO jobs (id, ticket_id, status, steps, cancel_requested, error, created_at, updated_at) VALUES (?, ?, ?, ?, 0, NULL, ?, ?)",
            params![id, ticket_id, JobStatus::Pending.as_str(), steps_json, now, now],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(JobError::DuplicateSubmission {
                    ticket_id: ticket_id.to_string(),
                    job_id: String::new(),
                });
            }
            Err(e) => return Err(db_err(e)),
        }

        let job = Self::require_job(&tx, &id)?;
        tx.commit().map_err(db_err)?;
        Ok(job)
    }

    fn get_status(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.lock()?;
        Self::load_job(&conn, job_id)
    }

    fn latest_for_ticket(&self, ticket_id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.lock()?;

        let job_id: Option<String> = conn
            .query_row(
                "SELECT id FROM jobs WHERE ticket_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![ticket_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        match job_id {
            Some(id) => Self::load_job(&conn, &id),
            None => Ok(None),
        }
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT id FROM jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let ids: Vec<String> = {
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| row.get(0))
                .map_err(db_err)?;
            rows.collect::<Result<_, _>>().map_err(db_err)?
        };

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = Self::load_job(&conn, &id)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn mark_running(&self, job_id: &str) -> Result<Job, JobError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        match job.status {
            JobStatus::Running => return Ok(job),
            JobStatus::Pending => {}
            status => return Err(JobError::invalid(job_id, "start", format!("job is {}", status))),
        }

        tx.execute(
            "UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?",
            params![JobStatus::Running.as_str(), Utc::now().to_rfc3339(), job_id],
        )
        .map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        tx.commit().map_err(db_err)?;
        Ok(job)
    }

    fn begin_attempt(&self, job_id: &str, step: StepName, attempt: u32) -> Result<Job, JobError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        if job.is_terminal() {
            return Err(JobError::invalid(
                job_id,
                "begin attempt on",
                format!("job is {}", job.status),
            ));
        }

        let record = job.step(step).ok_or_else(|| JobError::UnknownStep {
            job_id: job_id.to_string(),
            step,
        })?;

        match record.status {
            StepStatus::NotStarted | StepStatus::FailedRetryable => {}
            status => {
                return Err(JobError::invalid(
                    job_id,
                    "begin attempt on",
                    format!("step {} is {}", step, status),
                ))
            }
        }

        if attempt != record.attempts + 1 {
            return Err(JobError::invalid(
                job_id,
                "begin attempt on",
                format!(
                    "attempt {} of {} does not follow attempt {}",
                    attempt, step, record.attempts
                ),
            ));
        }

        let now = Utc::now();
        tx.execute(
            "INSERT INTO step_attempts (job_id, step, attempt, status, started_at) VALUES (?, ?, ?, ?, ?)",
            params![
                job_id,
                step.as_str(),
                attempt,
                StepStatus::InProgress.as_str(),
                now.to_rfc3339()
            ],
        )
        .map_err(db_err)?;
        Self::touch(&tx, job_id, now)?;

        let job = Self::require_job(&tx, job_id)?;
        tx.commit().map_err(db_err)?;
        Ok(job)
    }

    fn record_attempt(
        &self,
        job_id: &str,
        step: StepName,
        attempt: u32,
        settlement: &AttemptSettlement,
    ) -> Result<Job, JobError> {
        if !settlement.status.is_settled() {
            return Err(JobError::invalid(
                job_id,
                "record attempt on",
                format!("{} is not a settled status", settlement.status),
            ));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        if job.is_terminal() {
            return Err(JobError::invalid(
                job_id,
                "record attempt on",
                format!("job is {}", job.status),
            ));
        }

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM step_attempts WHERE job_id = ? AND step = ? AND attempt = ?",
                params![job_id, step.as_str(), attempt],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        match current.as_deref() {
            Some("in_progress") => {}
            Some(status) => {
                return Err(JobError::invalid(
                    job_id,
                    "record attempt on",
                    format!("attempt {} of {} already settled as {}", attempt, step, status),
                ))
            }
            None => {
                return Err(JobError::invalid(
                    job_id,
                    "record attempt on",
                    format!("attempt {} of {} was never started", attempt, step),
                ))
            }
        }

        let output_json = settlement
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(db_err)?;
        let now = Utc::now();

        tx.execute(
            "UPDATE step_attempts SET status = ?, error = ?, error_kind = ?, output = ?, finished_at = ? WHERE job_id = ? AND step = ? AND attempt = ?",
            params![
                settlement.status.as_str(),
                settlement.error,
                settlement.error_kind,
                output_json,
                now.to_rfc3339(),
                job_id,
                step.as_str(),
                attempt
            ],
        )
        .map_err(db_err)?;
        Self::touch(&tx, job_id, now)?;

        let job = Self::require_job(&tx, job_id)?;
        tx.commit().map_err(db_err)?;
        Ok(job)
    }

    fn request_cancel(&self, job_id: &str) -> Result<Job, JobError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        if !job.status.can_cancel() {
            return Err(JobError::invalid(
                job_id,
                "cancel",
                format!("job is {}", job.status),
            ));
        }

        tx.execute(
            "UPDATE jobs SET cancel_requested = 1, updated_at = ? WHERE id = ?",
            params![Utc::now().to_rfc3339(), job_id],
        )
        .map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        tx.commit().map_err(db_err)?;
        Ok(job)
    }

    fn mark_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job, JobError> {
        if !status.is_terminal() {
            return Err(JobError::invalid(
                job_id,
                "finish",
                format!("{} is not a terminal status", status),
            ));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        if job.is_terminal() {
            return Err(JobError::invalid(
                job_id,
                "finish",
                format!("job is already {}", job.status),
            ));
        }

        tx.execute(
            "UPDATE jobs SET status = ?, error = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), error, Utc::now().to_rfc3339(), job_id],
        )
        .map_err(db_err)?;

        let job = Self::require_job(&tx, job_id)?;
        tx.commit().map_err(db_err)?;
        Ok(job)
    }
}
