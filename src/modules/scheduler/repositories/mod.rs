pub mod memory_history_repository;
pub mod run_history_repository;

pub use memory_history_repository::MemoryRunHistoryStore;
pub use run_history_repository::{
    BeginOutcome, MySqlRunHistoryStore, RunCompletion, RunHistoryStore, StoreError,
};
