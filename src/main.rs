//! Fridge expiry job - periodic freshness reclassification and notification
//!
//! Every run selects food items that are about to expire or already expired,
//! moves them to the warning/danger freshness category, and notifies about them.
//!
//! Module structure:
//! - `domain/` - Core types (FoodItem, freshness scoring, Classification)
//! - `io/` - External interfaces (stores, notifiers, status HTTP server)
//! - `services/` - Business logic (ExpiryPipeline, ExpiryScheduler)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use fridge_expiry::domain::{ExpiryPolicy, ShelfLifeScorer};
use fridge_expiry::infra::{Config, Metrics, NotificationMode, StoreBackend};
use fridge_expiry::io::{
    FoodStore, HttpNotifier, LogNotifier, MemoryFoodStore, MqttNotifier, Notifier, PgFoodStore,
};
use fridge_expiry::services::{ExpiryPipeline, ExpiryScheduler, TriggerOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Fridge expiry job - marks expiring food and sends notifications
#[derive(Parser, Debug)]
#[command(name = "fridge-expiry", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Execute a single run and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(json: bool) {
    // Default: INFO, use RUST_LOG=debug for per-stage detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn FoodStore>> {
    match config.store_backend() {
        StoreBackend::Memory => {
            let store = match config.seed_file() {
                Some(path) => MemoryFoodStore::from_seed_file(path, config.normal_category())
                    .context("Failed to load seed file")?,
                None => MemoryFoodStore::with_default_categories(),
            };
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let url = config.database_url().context("store.database_url is not set")?;
            let store = PgFoodStore::connect(url, config.max_connections())
                .await
                .context("Failed to connect to postgres")?;
            if config.run_migrations() {
                store.run_migrations().await.context("Failed to run migrations")?;
            }
            Ok(Arc::new(store))
        }
    }
}

fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match config.notification_mode() {
        NotificationMode::Log => Ok(Arc::new(LogNotifier)),
        NotificationMode::Http => {
            let url = config.notification_http_url().context("notification.http_url is not set")?;
            let timeout = Duration::from_millis(config.notification_timeout_ms());
            Ok(Arc::new(HttpNotifier::new(url, timeout)?))
        }
        NotificationMode::Mqtt => Ok(Arc::new(MqttNotifier::new(config))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration from TOML file (decides the log format)
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    init_tracing(config.log_json());
    info!("fridge-expiry starting");

    info!(
        config_file = %config.config_file(),
        service_id = %config.service_id(),
        interval_ms = %config.interval_ms(),
        run_on_startup = %config.run_on_startup(),
        warning_window_days = %config.warning_window_days(),
        warning_score = %config.warning_score(),
        store_backend = ?config.store_backend(),
        notification_mode = ?config.notification_mode(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let store = build_store(&config).await?;
    let notifier = build_notifier(&config)?;
    let policy = ExpiryPolicy::from_config(&config);
    let scorer = Arc::new(ShelfLifeScorer::new(policy.warning_window_days));
    let pipeline = ExpiryPipeline::new(store, notifier, scorer, policy);

    let metrics = Arc::new(Metrics::new());
    let scheduler = ExpiryScheduler::new(
        pipeline,
        metrics.clone(),
        Duration::from_millis(config.interval_ms()),
        config.run_on_startup(),
    );

    if args.once {
        return match scheduler.trigger().await {
            TriggerOutcome::Completed(report) => {
                metrics.report().log();
                info!(run_id = %report.run_id, "fridge-expiry single run complete");
                Ok(())
            }
            TriggerOutcome::Failed(message) => Err(anyhow::anyhow!("expiry run failed: {message}")),
            TriggerOutcome::Skipped => Err(anyhow::anyhow!("expiry run skipped")),
        };
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start status HTTP server (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let status_scheduler = scheduler.clone();
        let service_id = config.service_id().to_string();
        let status_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = fridge_expiry::io::status_server::start_status_server(
                http_port,
                status_scheduler,
                service_id,
                status_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Status server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads); interval_secs = 0 disables it
    if let Some(metrics_interval) = config.metrics_report_interval() {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(metrics_interval);
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    } else {
        info!("metrics_reporter_disabled");
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run scheduler until shutdown; waits for an in-flight run
    scheduler.run(shutdown_rx).await;

    metrics.report().log();
    info!("fridge-expiry shutdown complete");
    Ok(())
}
