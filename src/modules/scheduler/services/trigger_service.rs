// Idempotent trigger for date-scoped billing runs.
//
// At most one invocation per (task, partition, run_date) may execute the
// job body, even when concurrent calls arrive from independent replicas.
// The winning caller inserts a Running record, runs the body, then records
// the terminal outcome. Losing callers get AlreadyActive right away and
// never block on the winner.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::modules::scheduler::models::{RunKey, RunRecord, RunReport, RunStatus};
use crate::modules::scheduler::repositories::{
    BeginOutcome, RunCompletion, RunHistoryStore, StoreError,
};

/// One account the run body could not bill.
#[derive(Debug, Clone)]
pub struct FailedItem {
    pub account_id: String,
    pub reason: String,
}

/// Errors reported by a job body.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    /// Some accounts were billed, some failed. The run is recorded Failed
    /// with per-account diagnostics; the partial report is kept for
    /// remediation, never passed off as success.
    #[error("{} of {} eligible accounts failed", failed.len(), failed.len() + report.processed.len())]
    Partial {
        failed: Vec<FailedItem>,
        report: RunReport,
    },

    /// The body could not run at all.
    #[error("{0}")]
    Fatal(String),
}

/// The work a trigger gates: scan the partition's eligible accounts for
/// the run date and produce invoices for them.
#[async_trait::async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run(&self, key: &RunKey) -> Result<RunReport, JobError>;
}

#[derive(thiserror::Error, Debug)]
pub enum TriggerError {
    #[error("invalid run key: {0}")]
    InvalidKey(String),

    /// Routine outcome under concurrent load: another invocation holds the
    /// slot for this key. Callers must not retry the same call.
    #[error("another invocation is already processing {key} (status: {status})")]
    AlreadyActive { key: RunKey, status: RunStatus },

    /// The body produced partial results; the run is recorded Failed.
    #[error("run {run_id} completed partially: {detail}")]
    PartialWorkFailure {
        run_id: String,
        detail: String,
        report: RunReport,
    },

    /// Transient storage failure; the whole trigger call may be retried.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("run {run_id} failed: {detail}")]
    JobFailed { run_id: String, detail: String },

    #[error(transparent)]
    Store(StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn map_store(e: StoreError) -> TriggerError {
    match e {
        StoreError::Unavailable(msg) => TriggerError::StorageUnavailable(msg),
        other => TriggerError::Store(other),
    }
}

/// Successful trigger result.
#[derive(Debug)]
pub struct TriggerOutcome {
    pub run_id: String,
    pub report: RunReport,
}

/// Gate around a [`ScheduledJob`], serialized through the run history.
pub struct RunTrigger {
    store: Arc<dyn RunHistoryStore>,
    job: Arc<dyn ScheduledJob>,
}

impl RunTrigger {
    pub fn new(store: Arc<dyn RunHistoryStore>, job: Arc<dyn ScheduledJob>) -> Self {
        Self { store, job }
    }

    /// Trigger the run for `key`.
    ///
    /// Exactly one of K concurrent calls with the same key proceeds to the
    /// job body; the others return [`TriggerError::AlreadyActive`]. No body
    /// side effect happens before the exclusivity insert is accepted.
    pub async fn trigger(&self, key: RunKey) -> Result<TriggerOutcome, TriggerError> {
        key.validate().map_err(TriggerError::InvalidKey)?;

        let record = RunRecord::begin(key.clone());
        match self.store.try_begin(&record).await.map_err(map_store)? {
            BeginOutcome::Conflict(status) => {
                info!(%key, %status, "run already active or completed, rejecting trigger");
                Err(TriggerError::AlreadyActive { key, status })
            }
            BeginOutcome::Accepted => {
                info!(%key, run_id = %record.id, "run slot acquired, executing job");
                self.execute_accepted(record).await
            }
        }
    }

    async fn execute_accepted(&self, record: RunRecord) -> Result<TriggerOutcome, TriggerError> {
        match self.job.run(&record.key).await {
            Ok(report) => {
                let snapshot = serde_json::to_value(&report)?;
                self.store
                    .complete(&record.id, RunCompletion::Succeeded { snapshot })
                    .await
                    .map_err(map_store)?;
                info!(
                    key = %record.key,
                    run_id = %record.id,
                    processed = report.processed.len(),
                    skipped = report.skipped.len(),
                    "run succeeded"
                );
                Ok(TriggerOutcome {
                    run_id: record.id,
                    report,
                })
            }
            Err(JobError::Partial { failed, report }) => {
                let detail = failed
                    .iter()
                    .map(|f| format!("{}: {}", f.account_id, f.reason))
                    .collect::<Vec<_>>()
                    .join("; ");
                // The processed subset has invoices downstream; persist it
                // with the failed record so remediation can see it
                let snapshot = serde_json::to_value(&report)?;
                self.store
                    .complete(
                        &record.id,
                        RunCompletion::Failed {
                            detail: detail.clone(),
                            snapshot: Some(snapshot),
                        },
                    )
                    .await
                    .map_err(map_store)?;
                warn!(
                    key = %record.key,
                    run_id = %record.id,
                    failed = failed.len(),
                    processed = report.processed.len(),
                    "run completed with partial failures"
                );
                Err(TriggerError::PartialWorkFailure {
                    run_id: record.id,
                    detail,
                    report,
                })
            }
            Err(JobError::Fatal(detail)) => {
                self.store
                    .complete(
                        &record.id,
                        RunCompletion::Failed {
                            detail: detail.clone(),
                            snapshot: None,
                        },
                    )
                    .await
                    .map_err(map_store)?;
                error!(key = %record.key, run_id = %record.id, %detail, "run failed");
                Err(TriggerError::JobFailed {
                    run_id: record.id,
                    detail,
                })
            }
        }
    }
}
