//! Invoice generation: the work body behind the scheduled-run trigger.

pub mod models;
pub mod repositories;
pub mod services;
