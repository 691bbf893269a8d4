use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An account a scheduled run may bill.
///
/// Accounts are synced into the billing store by an asynchronous
/// event-driven process; readers that need a freshly created account
/// should go through the poller rather than assume visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillableAccount {
    pub id: String,

    /// Partition (tenant/organization) the account belongs to
    pub partition: String,

    /// When the account was created in the billing store
    pub created_at: DateTime<Utc>,

    /// Flagged for manual review; excluded from scheduled billing
    /// regardless of when it was created
    pub review_required: bool,

    /// Amount invoiced per billing run
    pub monthly_fee: Decimal,
}
