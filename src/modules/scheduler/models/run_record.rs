// Run-history records for the scheduled invoice-generation trigger.
//
// One record per accepted trigger attempt. Records are append-only: a run
// transitions running -> succeeded | failed and is never deleted, so the
// table doubles as an audit trail of every billing run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Composite identity of one scheduled run: which task, for which
/// partition (tenant/organization), for which billing date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub task: String,
    pub partition: String,
    pub run_date: NaiveDate,
}

impl RunKey {
    pub fn new(task: impl Into<String>, partition: impl Into<String>, run_date: NaiveDate) -> Self {
        Self {
            task: task.into(),
            partition: partition.into(),
            run_date,
        }
    }

    /// Reject blank task or partition names before they reach storage.
    pub fn validate(&self) -> Result<(), String> {
        if self.task.trim().is_empty() {
            return Err("task must not be blank".to_string());
        }
        if self.partition.trim().is_empty() {
            return Err("partition must not be blank".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.task, self.partition, self.run_date)
    }
}

/// Run status lifecycle: `Running -> Succeeded | Failed`, both terminal.
///
/// A Running or Succeeded record blocks new attempts for the same key;
/// a Failed record does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "running")]
    Running,

    #[serde(rename = "succeeded")]
    Succeeded,

    #[serde(rename = "failed")]
    Failed,
}

impl RunStatus {
    /// Whether this status holds the exclusivity slot for its key.
    pub fn blocks_new_attempt(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Succeeded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

/// One trigger attempt in the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run ID (UUID), generated when the attempt is accepted
    pub id: String,

    pub key: RunKey,

    pub status: RunStatus,

    /// When the exclusivity slot was acquired
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,

    /// Diagnostic detail for failed runs (which accounts failed, and why)
    pub error_detail: Option<String>,

    /// Snapshot of the processed/skipped account sets for succeeded runs
    pub snapshot: Option<serde_json::Value>,
}

impl RunRecord {
    /// Create the Running record for a freshly accepted attempt.
    pub fn begin(key: RunKey) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error_detail: None,
            snapshot: None,
        }
    }
}

/// Outcome of one successful run body: which accounts were billed and
/// which were deliberately left out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Account ids an invoice was generated for
    pub processed: Vec<String>,
    /// Account ids excluded from this run, with the reason
    pub skipped: Vec<SkippedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedItem {
    pub account_id: String,
    pub reason: String,
}
