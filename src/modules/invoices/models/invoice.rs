use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::BillableAccount;

/// An invoice produced by a scheduled billing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique invoice ID (UUID)
    pub id: String,

    pub account_id: String,

    pub partition: String,

    /// Billing date of the run that generated this invoice
    pub run_date: NaiveDate,

    pub amount: Decimal,

    pub issued_at: DateTime<Utc>,
}

impl Invoice {
    /// Build the invoice for one account in a run.
    pub fn for_account(account: &BillableAccount, run_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            partition: account.partition.clone(),
            run_date,
            amount: account.monthly_fee,
            issued_at: Utc::now(),
        }
    }
}
