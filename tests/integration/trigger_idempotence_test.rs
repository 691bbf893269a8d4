//! Re-trigger semantics: succeeded runs stay closed, failed runs reopen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use billrun::invoices::models::{BillableAccount, Invoice};
use billrun::invoices::repositories::{
    BillingError, InvoiceSink, MemoryBillingRepository,
};
use billrun::invoices::services::InvoiceGenerationJob;
use billrun::scheduler::models::{RunKey, RunStatus};
use billrun::scheduler::repositories::MemoryRunHistoryStore;
use billrun::scheduler::services::{RunTrigger, TriggerError};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

fn run_key() -> RunKey {
    RunKey::new(
        "invoice-generation",
        "org-1",
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
    )
}

fn account(id: &str, review_required: bool) -> BillableAccount {
    let cutoff = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
    BillableAccount {
        id: id.to_string(),
        partition: "org-1".to_string(),
        created_at: cutoff - Duration::hours(2),
        review_required,
        monthly_fee: dec!(150.00),
    }
}

/// Sink that refuses invoices for one account while tripped.
struct FlakySink {
    inner: MemoryBillingRepository,
    failing_account: String,
    tripped: AtomicBool,
}

#[async_trait]
impl InvoiceSink for FlakySink {
    async fn record_invoice(&self, invoice: &Invoice) -> Result<(), BillingError> {
        if self.tripped.load(Ordering::SeqCst) && invoice.account_id == self.failing_account {
            return Err(BillingError::Rejected("downstream write refused".to_string()));
        }
        self.inner.record_invoice(invoice).await
    }

    async fn invoices_for_run(
        &self,
        partition: &str,
        run_date: chrono::NaiveDate,
    ) -> Result<Vec<Invoice>, BillingError> {
        self.inner.invoices_for_run(partition, run_date).await
    }
}

#[tokio::test]
async fn re_trigger_after_success_is_rejected_without_duplicate_output() {
    let history = Arc::new(MemoryRunHistoryStore::new());
    let billing = Arc::new(MemoryBillingRepository::new());
    billing.seed_account(account("acct-1", false)).await;
    billing.seed_account(account("acct-2", false)).await;

    let job = Arc::new(InvoiceGenerationJob::new(billing.clone(), billing.clone()));
    let trigger = RunTrigger::new(history.clone(), job);

    trigger.trigger(run_key()).await.unwrap();
    assert_eq!(billing.invoice_count().await, 2);

    // Second call for the same key right after the first completed
    let second = trigger.trigger(run_key()).await;
    match second {
        Err(TriggerError::AlreadyActive { status, .. }) => {
            assert_eq!(status, RunStatus::Succeeded);
        }
        other => panic!("expected AlreadyActive, got {:?}", other.map(|_| ())),
    }

    // No duplicate invoices, no second history record
    assert_eq!(billing.invoice_count().await, 2);
    assert_eq!(history.attempts_for(&run_key()).await.len(), 1);
}

#[tokio::test]
async fn partial_failure_is_recorded_failed_with_diagnostics() {
    let history = Arc::new(MemoryRunHistoryStore::new());
    let billing = MemoryBillingRepository::new();
    billing.seed_account(account("acct-ok", false)).await;
    billing.seed_account(account("acct-bad", false)).await;

    let sink = Arc::new(FlakySink {
        inner: billing.clone(),
        failing_account: "acct-bad".to_string(),
        tripped: AtomicBool::new(true),
    });
    let job = Arc::new(InvoiceGenerationJob::new(Arc::new(billing.clone()), sink));
    let trigger = RunTrigger::new(history.clone(), job);

    let result = trigger.trigger(run_key()).await;
    match result {
        Err(TriggerError::PartialWorkFailure { detail, report, .. }) => {
            assert!(detail.contains("acct-bad"));
            // The successful subset is still reported for remediation
            assert_eq!(report.processed, vec!["acct-ok".to_string()]);
        }
        other => panic!("expected PartialWorkFailure, got {:?}", other.map(|_| ())),
    }

    let record = history.attempts_for(&run_key()).await.pop().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error_detail.unwrap().contains("acct-bad"));

    // The processed subset has an invoice downstream, so the failed record
    // must carry it in its snapshot for remediation
    assert_eq!(billing.invoice_count().await, 1);
    let snapshot = record.snapshot.expect("failed run should persist a snapshot");
    assert_eq!(
        snapshot["processed"],
        serde_json::json!(["acct-ok"]),
        "snapshot should list the accounts that were billed before the failure"
    );
}

#[tokio::test]
async fn re_trigger_after_failure_is_permitted_and_can_succeed() {
    let history = Arc::new(MemoryRunHistoryStore::new());
    let billing = MemoryBillingRepository::new();
    billing.seed_account(account("acct-1", false)).await;

    let sink = Arc::new(FlakySink {
        inner: billing.clone(),
        failing_account: "acct-1".to_string(),
        tripped: AtomicBool::new(true),
    });
    let job = Arc::new(InvoiceGenerationJob::new(
        Arc::new(billing.clone()),
        sink.clone(),
    ));
    let trigger = RunTrigger::new(history.clone(), job);

    let first = trigger.trigger(run_key()).await;
    assert!(matches!(first, Err(TriggerError::PartialWorkFailure { .. })));

    // Downstream recovers; a fresh attempt for the same key is accepted
    sink.tripped.store(false, Ordering::SeqCst);
    let second = trigger.trigger(run_key()).await.unwrap();
    assert_eq!(second.report.processed, vec!["acct-1".to_string()]);
    assert_eq!(billing.invoice_count().await, 1);

    // Both attempts remain in the audit trail
    let attempts = history.attempts_for(&run_key()).await;
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].status, RunStatus::Failed);
    assert_eq!(attempts[1].status, RunStatus::Succeeded);
}
