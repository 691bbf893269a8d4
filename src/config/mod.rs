use crate::core::{AppError, Result};
use serde::Deserialize;
use std::env;

pub mod database;

pub use database::DatabaseConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
}

/// Settings for the scheduled invoice-generation run
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Logical task name recorded in the run history
    pub task: String,
    /// Partition (tenant/organization) this instance bills
    pub partition: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            scheduler: SchedulerConfig {
                task: env::var("SCHEDULER_TASK")
                    .unwrap_or_else(|_| "invoice-generation".to_string()),
                partition: env::var("SCHEDULER_PARTITION")
                    .map_err(|_| AppError::Configuration("SCHEDULER_PARTITION not set".to_string()))?,
            },
        };

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.task.trim().is_empty() {
            return Err(AppError::configuration("SCHEDULER_TASK must not be blank"));
        }
        if self.scheduler.partition.trim().is_empty() {
            return Err(AppError::configuration(
                "SCHEDULER_PARTITION must not be blank",
            ));
        }
        Ok(())
    }
}
