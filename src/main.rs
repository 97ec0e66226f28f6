use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use critalert::api::server::run_server;
use critalert::catalog::ThresholdCatalog;
use critalert::classifier::ClassifierConfig;
use critalert::config;
use critalert::core_state::CoreState;
use critalert::dispatch::{LogSender, NotificationDispatcher, RetryConfig};
use critalert::engine::AlertEngine;
use critalert::policy::EscalationPolicy;
use critalert::scheduler::start_scheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let data_dir = config::app_data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // Run migrations up front so the scheduler and API see a ready schema.
    let db_path = config::db_path();
    critalert::db::open_database(&db_path)?;

    let thresholds_path = config::thresholds_path();
    let catalog = if thresholds_path.exists() {
        tracing::info!(path = %thresholds_path.display(), "Loading threshold catalog");
        ThresholdCatalog::load(&thresholds_path)?
    } else {
        ThresholdCatalog::builtin()
    };
    tracing::info!(version = catalog.version(), rule_count = catalog.rule_count(), "Threshold catalog ready");

    let policy_path = config::escalation_policy_path();
    let policy = if policy_path.exists() {
        tracing::info!(path = %policy_path.display(), "Loading escalation policy");
        EscalationPolicy::load(&policy_path)?
    } else {
        EscalationPolicy::builtin()
    };
    tracing::info!(version = policy.version(), steps = policy.step_count(), "Escalation policy ready");

    let dispatcher = Arc::new(NotificationDispatcher::new(
        LogSender::all_channels(),
        RetryConfig::default(),
    ));
    let engine = Arc::new(AlertEngine::new(policy, dispatcher));

    // The scheduler owns its own connection and thread; the handle joins
    // on drop at the end of main.
    let _scheduler = start_scheduler(engine.clone(), db_path.clone());

    let state = Arc::new(CoreState::new(
        db_path,
        catalog,
        ClassifierConfig::default(),
        engine,
    ));

    let bind_addr =
        std::env::var("CRITALERT_BIND").unwrap_or_else(|_| config::DEFAULT_BIND_ADDR.to_string());
    run_server(state, &bind_addr).await?;
    Ok(())
}
