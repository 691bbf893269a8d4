pub mod trigger_service;

pub use trigger_service::{
    FailedItem, JobError, RunTrigger, ScheduledJob, TriggerError, TriggerOutcome,
};
