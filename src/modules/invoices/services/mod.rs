pub mod generation_service;

pub use generation_service::{cutoff_for, select_eligible, InvoiceGenerationJob, SkipReason};
