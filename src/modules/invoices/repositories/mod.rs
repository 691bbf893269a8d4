pub mod billing_repository;
pub mod memory_billing_repository;

pub use billing_repository::{AccountSource, BillingError, InvoiceSink, MySqlBillingRepository};
pub use memory_billing_repository::MemoryBillingRepository;
