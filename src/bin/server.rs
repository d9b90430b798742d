use apigraveyard::alerting::EvaluationService;
use apigraveyard::db::models::{AlertFilter, PageParams};
use apigraveyard::db::services::{SeaOrmStore, dashboard_service};
use apigraveyard::db::{AlertStore, HealthCheckStore};
use apigraveyard::monitoring::{HealthCheckScheduler, HttpProber, WorkerPool};
use apigraveyard::server::{AlertBroadcaster, MonitorConfig};
use apigraveyard::version::VERSION;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the health check scheduler until Ctrl-C
    Run,
    /// Probe one API right now and print the stored result
    CheckNow {
        #[arg(long)]
        api_id: i32,
    },
    /// Per-user dashboard counters
    Summary {
        #[arg(long)]
        user_id: i32,
    },
    /// Uptime and latency of one API over the configured window
    Stats {
        #[arg(long)]
        api_id: i32,
    },
    /// Health check history of one API, newest first
    History {
        #[arg(long)]
        api_id: i32,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        size: u64,
    },
    /// Alerts of one user, newest first
    Alerts {
        #[arg(long)]
        user_id: i32,
        #[arg(long)]
        unresolved: bool,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        size: u64,
    },
    /// Mark an alert resolved
    Resolve {
        #[arg(long)]
        alert_id: i32,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "apigraveyard.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Human-readable on stderr so JSON command output stays clean on stdout.
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = MonitorConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!("Starting apigraveyard, version: {}", VERSION);

    let store = SeaOrmStore::connect(config.require_database_url()?, 10).await?;
    store.sync_schema().await?;
    let store = Arc::new(store);

    let broadcaster = AlertBroadcaster::default();
    let engine = Arc::new(EvaluationService::new(store.clone(), broadcaster.clone()));
    let prober = Arc::new(HttpProber::new(config.probe_timeout_secs)?);
    let scheduler = HealthCheckScheduler::new(
        store.clone(),
        prober,
        engine,
        WorkerPool::new(config.worker_pool_size),
    );

    match args.command {
        Command::Run => {
            spawn_alert_logger(&broadcaster);
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl-C.");
                }
                info!("Shutdown signal received.");
            };
            scheduler.run_until(config.tick_interval(), shutdown).await;
        }
        Command::CheckNow { api_id } => {
            let check = scheduler.check_now(api_id).await?;
            print_json(&check)?;
        }
        Command::Summary { user_id } => {
            print_json(&dashboard_service::summary(store.as_ref(), user_id).await?)?;
        }
        Command::Stats { api_id } => {
            let stats =
                dashboard_service::api_stats(store.as_ref(), api_id, config.stats_window()).await?;
            print_json(&stats)?;
        }
        Command::History { api_id, page, size } => {
            let history = store
                .list_checks_by_api(api_id, PageParams { page, size })
                .await?;
            print_json(&history)?;
        }
        Command::Alerts {
            user_id,
            unresolved,
            page,
            size,
        } => {
            let filter = AlertFilter {
                resolved: unresolved.then_some(false),
                severity: None,
            };
            let alerts = store
                .list_alerts_by_user(user_id, filter, PageParams { page, size })
                .await?;
            print_json(&alerts)?;
        }
        Command::Resolve { alert_id } => match store.resolve_alert(alert_id).await? {
            Some(alert) => print_json(&alert)?,
            None => return Err(format!("Alert {alert_id} not found").into()),
        },
    }

    Ok(())
}

/// Stand-in for notification delivery: every committed alert is logged.
fn spawn_alert_logger(broadcaster: &AlertBroadcaster) {
    let mut rx = broadcaster.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(alert) => info!(
                    alert_id = alert.id,
                    api_id = alert.api_id,
                    user_id = alert.user_id,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    "Alert raised: {}",
                    alert.title
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Alert logger fell behind.");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
