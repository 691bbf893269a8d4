//! In-memory accounts and invoices for tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::modules::invoices::models::{BillableAccount, Invoice};

use super::billing_repository::{AccountSource, BillingError, InvoiceSink};

/// In-memory billing store. Cloning creates a new handle to the same
/// underlying data.
pub struct MemoryBillingRepository {
    accounts: Arc<Mutex<Vec<BillableAccount>>>,
    invoices: Arc<Mutex<Vec<Invoice>>>,
}

impl Clone for MemoryBillingRepository {
    fn clone(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
            invoices: Arc::clone(&self.invoices),
        }
    }
}

impl Default for MemoryBillingRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBillingRepository {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(Mutex::new(Vec::new())),
            invoices: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn seed_account(&self, account: BillableAccount) {
        self.accounts.lock().await.push(account);
    }

    pub async fn invoice_count(&self) -> usize {
        self.invoices.lock().await.len()
    }
}

#[async_trait]
impl AccountSource for MemoryBillingRepository {
    async fn accounts_in_partition(
        &self,
        partition: &str,
    ) -> Result<Vec<BillableAccount>, BillingError> {
        Ok(self
            .accounts
            .lock()
            .await
            .iter()
            .filter(|a| a.partition == partition)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InvoiceSink for MemoryBillingRepository {
    async fn record_invoice(&self, invoice: &Invoice) -> Result<(), BillingError> {
        let mut invoices = self.invoices.lock().await;
        if invoices
            .iter()
            .any(|i| i.account_id == invoice.account_id && i.run_date == invoice.run_date)
        {
            return Err(BillingError::Rejected(format!(
                "invoice for account '{}' on {} already exists",
                invoice.account_id, invoice.run_date
            )));
        }
        invoices.push(invoice.clone());
        Ok(())
    }

    async fn invoices_for_run(
        &self,
        partition: &str,
        run_date: NaiveDate,
    ) -> Result<Vec<Invoice>, BillingError> {
        Ok(self
            .invoices
            .lock()
            .await
            .iter()
            .filter(|i| i.partition == partition && i.run_date == run_date)
            .cloned()
            .collect())
    }
}
