pub mod run_record;

pub use run_record::{RunKey, RunRecord, RunReport, RunStatus, SkippedItem};
