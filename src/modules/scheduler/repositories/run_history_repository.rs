// Run-history storage for the invoice-generation trigger.
//
// The conditional insert here is the sole serialization point for
// concurrent trigger calls: exclusivity comes from a database uniqueness
// constraint, never from an in-process lock, because trigger invocations
// may originate from independent service replicas.
//
// Schema (schedule_runs): the `active_key` column holds
// `task|partition|run_date` while a run is running or succeeded and NULL
// once it fails, under a unique index. A failed run therefore releases the
// slot and a retry can insert a fresh record; a running or succeeded run
// blocks duplicates at the database level.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;

use crate::modules::scheduler::models::{RunKey, RunRecord, RunStatus};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Transient connectivity problems; the whole trigger call may be retried
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("run record not found: {0}")]
    NotFound(String),

    /// Attempted transition out of succeeded/failed
    #[error("run {0} is already in a terminal state")]
    Terminal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt run record: {0}")]
    Corrupt(String),
}

/// Result of a conditional insert attempt.
#[derive(Debug)]
pub enum BeginOutcome {
    /// The record was inserted; the caller holds the exclusivity slot.
    Accepted,
    /// A running or succeeded record already exists for this key.
    Conflict(RunStatus),
}

/// Terminal transition applied when the run body finishes.
///
/// Failed runs still persist a snapshot when the body got partway
/// through: the processed subset has invoices downstream, and remediation
/// needs to see it in the history, not just in the caller's error.
#[derive(Debug)]
pub enum RunCompletion {
    Succeeded {
        snapshot: serde_json::Value,
    },
    Failed {
        detail: String,
        snapshot: Option<serde_json::Value>,
    },
}

/// Append-only store of trigger attempts.
#[async_trait]
pub trait RunHistoryStore: Send + Sync {
    /// Atomically insert a Running record for the key.
    ///
    /// Must reject with `Conflict` when a Running or Succeeded record
    /// already exists for the same key. A Failed record does not block.
    async fn try_begin(&self, record: &RunRecord) -> Result<BeginOutcome, StoreError>;

    /// Transition a Running record to its terminal status.
    async fn complete(&self, id: &str, completion: RunCompletion) -> Result<(), StoreError>;

    /// Most recent attempt for the key, if any.
    async fn find_by_key(&self, key: &RunKey) -> Result<Option<RunRecord>, StoreError>;
}

/// MySQL-backed run history.
pub struct MySqlRunHistoryStore {
    pool: MySqlPool,
}

impl MySqlRunHistoryStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl RunHistoryStore for MySqlRunHistoryStore {
    async fn try_begin(&self, record: &RunRecord) -> Result<BeginOutcome, StoreError> {
        let insert = sqlx::query(
            r#"
            INSERT INTO schedule_runs (
                id, task, partition_key, run_date, status,
                started_at, finished_at, error_detail, snapshot, active_key
            ) VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, NULL, CONCAT(?, '|', ?, '|', ?))
            "#,
        )
        .bind(&record.id)
        .bind(&record.key.task)
        .bind(&record.key.partition)
        .bind(record.key.run_date)
        .bind(record.status.to_string())
        .bind(record.started_at)
        .bind(&record.key.task)
        .bind(&record.key.partition)
        .bind(record.key.run_date)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => Ok(BeginOutcome::Accepted),
            Err(e) => {
                let is_duplicate = e
                    .as_database_error()
                    .map(|db_err| db_err.is_unique_violation())
                    .unwrap_or(false);
                if !is_duplicate {
                    return Err(map_sqlx(e));
                }

                // Lost the race; report which status holds the slot.
                let blocking: Option<(String,)> = sqlx::query_as(
                    r#"
                    SELECT status FROM schedule_runs
                    WHERE task = ? AND partition_key = ? AND run_date = ?
                      AND status IN ('running', 'succeeded')
                    LIMIT 1
                    "#,
                )
                .bind(&record.key.task)
                .bind(&record.key.partition)
                .bind(record.key.run_date)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

                let status = blocking
                    .map(|(s,)| s.parse::<RunStatus>())
                    .transpose()
                    .map_err(StoreError::Corrupt)?
                    // The blocker finished between our insert and this read;
                    // treat it as still running, the caller only rejects.
                    .unwrap_or(RunStatus::Running);

                Ok(BeginOutcome::Conflict(status))
            }
        }
    }

    async fn complete(&self, id: &str, completion: RunCompletion) -> Result<(), StoreError> {
        let (status, error_detail, snapshot) = match completion {
            RunCompletion::Succeeded { snapshot } => (RunStatus::Succeeded, None, Some(snapshot)),
            RunCompletion::Failed { detail, snapshot } => {
                (RunStatus::Failed, Some(detail), snapshot)
            }
        };

        let result = sqlx::query(
            r#"
            UPDATE schedule_runs
            SET status = ?,
                finished_at = ?,
                error_detail = ?,
                snapshot = ?,
                active_key = CASE WHEN ? = 'failed' THEN NULL ELSE active_key END
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(error_detail)
        .bind(snapshot)
        .bind(status.to_string())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            let existing: Option<(String,)> =
                sqlx::query_as(r#"SELECT status FROM schedule_runs WHERE id = ?"#)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx)?;

            return match existing {
                None => Err(StoreError::NotFound(id.to_string())),
                Some(_) => Err(StoreError::Terminal(id.to_string())),
            };
        }

        Ok(())
    }

    async fn find_by_key(&self, key: &RunKey) -> Result<Option<RunRecord>, StoreError> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT id, task, partition_key, run_date, status,
                   started_at, finished_at, error_detail, snapshot
            FROM schedule_runs
            WHERE task = ? AND partition_key = ? AND run_date = ?
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(&key.task)
        .bind(&key.partition)
        .bind(key.run_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(RunRow::into_record).transpose()
    }
}

// Helper struct for database mapping

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: String,
    task: String,
    partition_key: String,
    run_date: NaiveDate,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    error_detail: Option<String>,
    snapshot: Option<serde_json::Value>,
}

impl RunRow {
    fn into_record(self) -> Result<RunRecord, StoreError> {
        let status = self.status.parse::<RunStatus>().map_err(StoreError::Corrupt)?;

        Ok(RunRecord {
            id: self.id,
            key: RunKey {
                task: self.task,
                partition: self.partition_key,
                run_date: self.run_date,
            },
            status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error_detail: self.error_detail,
            snapshot: self.snapshot,
        })
    }
}
