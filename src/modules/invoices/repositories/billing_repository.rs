// Billing collaborators behind traits so the generation job can run
// against MySQL in production and in-memory doubles in tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;

use crate::modules::invoices::models::{BillableAccount, Invoice};

#[derive(thiserror::Error, Debug)]
pub enum BillingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The sink refused the invoice (constraint violation, downstream
    /// validation); carries a reason usable in run diagnostics
    #[error("invoice rejected: {0}")]
    Rejected(String),
}

/// Read side: the accounts a run may bill.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// All accounts in the partition, regardless of eligibility.
    /// Eligibility filtering is the job's responsibility.
    async fn accounts_in_partition(
        &self,
        partition: &str,
    ) -> Result<Vec<BillableAccount>, BillingError>;
}

/// Write side: where generated invoices land.
#[async_trait]
pub trait InvoiceSink: Send + Sync {
    async fn record_invoice(&self, invoice: &Invoice) -> Result<(), BillingError>;

    /// Invoices a given run produced; used to verify idempotence.
    async fn invoices_for_run(
        &self,
        partition: &str,
        run_date: NaiveDate,
    ) -> Result<Vec<Invoice>, BillingError>;
}

/// MySQL-backed accounts and invoices.
pub struct MySqlBillingRepository {
    pool: MySqlPool,
}

impl MySqlBillingRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountSource for MySqlBillingRepository {
    async fn accounts_in_partition(
        &self,
        partition: &str,
    ) -> Result<Vec<BillableAccount>, BillingError> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, partition_key, created_at, review_required, monthly_fee
            FROM billable_accounts
            WHERE partition_key = ?
            ORDER BY created_at
            "#,
        )
        .bind(partition)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AccountRow::into_account).collect())
    }
}

#[async_trait]
impl InvoiceSink for MySqlBillingRepository {
    async fn record_invoice(&self, invoice: &Invoice) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (id, account_id, partition_key, run_date, amount, issued_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.account_id)
        .bind(&invoice.partition)
        .bind(invoice.run_date)
        .bind(invoice.amount)
        .bind(invoice.issued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return BillingError::Rejected(format!(
                        "invoice for account '{}' on {} already exists",
                        invoice.account_id, invoice.run_date
                    ));
                }
            }
            BillingError::Database(e)
        })?;

        Ok(())
    }

    async fn invoices_for_run(
        &self,
        partition: &str,
        run_date: NaiveDate,
    ) -> Result<Vec<Invoice>, BillingError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, partition_key, run_date, amount, issued_at
            FROM invoices
            WHERE partition_key = ? AND run_date = ?
            ORDER BY issued_at
            "#,
        )
        .bind(partition)
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(InvoiceRow::into_invoice).collect())
    }
}

// Helper structs for database mapping

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: String,
    partition_key: String,
    created_at: DateTime<Utc>,
    review_required: bool,
    monthly_fee: Decimal,
}

impl AccountRow {
    fn into_account(self) -> BillableAccount {
        BillableAccount {
            id: self.id,
            partition: self.partition_key,
            created_at: self.created_at,
            review_required: self.review_required,
            monthly_fee: self.monthly_fee,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    account_id: String,
    partition_key: String,
    run_date: NaiveDate,
    amount: Decimal,
    issued_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self) -> Invoice {
        Invoice {
            id: self.id,
            account_id: self.account_id,
            partition: self.partition_key,
            run_date: self.run_date,
            amount: self.amount,
            issued_at: self.issued_at,
        }
    }
}
