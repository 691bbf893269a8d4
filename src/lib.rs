//! Billrun: idempotent scheduled billing runs
//!
//! The core of an invoice-management service's batch side: a storage
//! serialized trigger that generates invoices for a (task, partition,
//! date) key at most once, an append-only run history behind it, and a
//! bounded-retry poller for observing eventually-consistent state.

pub mod config;
pub mod core;
pub mod modules;

// Re-export commonly used types
pub use modules::invoices;
pub use modules::poller;
pub use modules::scheduler;
