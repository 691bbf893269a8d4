//! Idempotent scheduled-run trigger and its append-only run history.

pub mod models;
pub mod repositories;
pub mod services;
