// Scheduled invoice generation: the job body gated by the run trigger.
//
// Eligibility is strict: accounts created at or after the cutoff (midnight
// UTC of the run date) wait for the next run, and accounts flagged for
// manual review are never billed by a scheduled run, whatever their age.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::modules::invoices::models::{BillableAccount, Invoice};
use crate::modules::invoices::repositories::{AccountSource, InvoiceSink};
use crate::modules::scheduler::models::{RunKey, RunReport, SkippedItem};
use crate::modules::scheduler::services::{FailedItem, JobError, ScheduledJob};

/// Why an account was left out of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Flagged for manual review
    ReviewRequired,
    /// Created at or after the run's cutoff boundary
    AfterCutoff,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ReviewRequired => write!(f, "review required"),
            SkipReason::AfterCutoff => write!(f, "created at or after cutoff"),
        }
    }
}

/// Cutoff boundary for a run date: midnight UTC at the start of the date.
pub fn cutoff_for(run_date: NaiveDate) -> DateTime<Utc> {
    run_date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Split accounts into billable and skipped sets.
///
/// The cutoff comparison is strict: an account created exactly at the
/// boundary is excluded. Review-required accounts are excluded regardless
/// of cutoff.
pub fn select_eligible(
    accounts: Vec<BillableAccount>,
    cutoff: DateTime<Utc>,
) -> (Vec<BillableAccount>, Vec<(String, SkipReason)>) {
    let mut eligible = Vec::new();
    let mut skipped = Vec::new();

    for account in accounts {
        if account.review_required {
            skipped.push((account.id, SkipReason::ReviewRequired));
        } else if account.created_at >= cutoff {
            skipped.push((account.id, SkipReason::AfterCutoff));
        } else {
            eligible.push(account);
        }
    }

    (eligible, skipped)
}

/// Generates one invoice per eligible account in the partition.
pub struct InvoiceGenerationJob {
    accounts: Arc<dyn AccountSource>,
    invoices: Arc<dyn InvoiceSink>,
}

impl InvoiceGenerationJob {
    pub fn new(accounts: Arc<dyn AccountSource>, invoices: Arc<dyn InvoiceSink>) -> Self {
        Self { accounts, invoices }
    }
}

#[async_trait::async_trait]
impl ScheduledJob for InvoiceGenerationJob {
    async fn run(&self, key: &RunKey) -> Result<RunReport, JobError> {
        let accounts = self
            .accounts
            .accounts_in_partition(&key.partition)
            .await
            .map_err(|e| JobError::Fatal(format!("failed to load accounts: {}", e)))?;

        let cutoff = cutoff_for(key.run_date);
        let (eligible, skipped) = select_eligible(accounts, cutoff);
        debug!(
            partition = %key.partition,
            eligible = eligible.len(),
            skipped = skipped.len(),
            %cutoff,
            "eligibility selection complete"
        );

        let mut report = RunReport {
            processed: Vec::new(),
            skipped: skipped
                .into_iter()
                .map(|(account_id, reason)| SkippedItem {
                    account_id,
                    reason: reason.to_string(),
                })
                .collect(),
        };
        let mut failed = Vec::new();

        for account in &eligible {
            let invoice = Invoice::for_account(account, key.run_date);
            match self.invoices.record_invoice(&invoice).await {
                Ok(()) => report.processed.push(account.id.clone()),
                Err(e) => failed.push(FailedItem {
                    account_id: account.id.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if !failed.is_empty() {
            return Err(JobError::Partial { failed, report });
        }

        info!(
            partition = %key.partition,
            run_date = %key.run_date,
            generated = report.processed.len(),
            "invoice generation complete"
        );
        Ok(report)
    }
}
