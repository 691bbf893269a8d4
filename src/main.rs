use std::sync::Arc;

use billrun::config::Config;
use billrun::invoices::repositories::MySqlBillingRepository;
use billrun::invoices::services::InvoiceGenerationJob;
use billrun::scheduler::models::RunKey;
use billrun::scheduler::repositories::MySqlRunHistoryStore;
use billrun::scheduler::services::{RunTrigger, TriggerError};
use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billrun=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting billrun scheduled invoice generation");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Partition: {}", config.scheduler.partition);

    // Create database connection pool
    let db_pool = config.database.create_pool().await?;
    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    // Wire the trigger: MySQL-backed run history and billing store
    let history = Arc::new(MySqlRunHistoryStore::new(db_pool.clone()));
    let billing = Arc::new(MySqlBillingRepository::new(db_pool));
    let job = Arc::new(InvoiceGenerationJob::new(billing.clone(), billing));
    let trigger = RunTrigger::new(history, job);

    let key = RunKey::new(
        config.scheduler.task.clone(),
        config.scheduler.partition.clone(),
        Utc::now().date_naive(),
    );

    match trigger.trigger(key).await {
        Ok(outcome) => {
            tracing::info!(
                run_id = %outcome.run_id,
                processed = outcome.report.processed.len(),
                skipped = outcome.report.skipped.len(),
                "billing run finished"
            );
            Ok(())
        }
        // Routine under concurrent replicas; another instance won the slot
        Err(TriggerError::AlreadyActive { key, status }) => {
            tracing::info!(%key, %status, "billing run already handled elsewhere");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
