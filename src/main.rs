use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wms_file_sync::config::{AppConfig, DEFAULT_CONFIG_FILE};
use wms_file_sync::ledger::{SyncResult, SyncStatus};
use wms_file_sync::service::SyncService;
use wms_file_sync::{EntityKind, OrderStatus};

#[derive(Parser)]
#[command(name = "wms-file-sync")]
#[command(about = "Imports WMS XML drop files and synchronizes them with the WMS API")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C
    Run {
        /// Start processing without waiting for the health probe
        #[arg(long)]
        skip_probe: bool,
    },
    /// Run every watcher (or one) once and exit
    Process {
        #[arg(long)]
        watcher: Option<String>,
    },
    /// Re-attempt every failed synchronization
    RetryFailed,
    /// List entities whose last synchronization failed
    Failed,
    /// Show aggregate synchronization statistics
    Stats,
    /// Show the synchronization status of one entity
    Status { kind: EntityKind, id: String },
    /// Show the synchronization history of one entity
    History { kind: EntityKind, id: String },
    /// Show the most recent synchronization results
    Recent {
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Drop history entries older than the given age (latest entry per entity is kept)
    Prune {
        #[arg(long)]
        older_than_days: i64,
    },
    /// Push an order status change to the WMS
    OrderStatus {
        kind: EntityKind,
        order_id: i32,
        status: OrderStatus,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_bootstrap(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration '{}'", cli.config.display()))?;
    init_tracing(&config);

    let service = SyncService::build(config)
        .await
        .context("Failed to start sync service")?;

    match cli.command {
        Command::Run { skip_probe } => {
            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("shutdown requested");
                    }
                    cancel.cancel();
                });
            }
            if skip_probe {
                service.start_processing();
            }
            service.run(&cancel).await?;
        }
        Command::Process { watcher } => {
            let reports = service
                .process_once(watcher.as_deref(), &CancellationToken::new())
                .await?;
            for report in reports {
                println!(
                    "{}: discovered={} processed={} failed={}",
                    report.watcher, report.discovered, report.processed, report.failed
                );
            }
        }
        Command::RetryFailed => {
            let results = service.retry_failed().await?;
            let recovered = results.iter().filter(|r| r.success).count();
            println!("retried {} entities, {} succeeded", results.len(), recovered);
            for result in results.iter().filter(|r| !r.success) {
                print_result(result);
            }
        }
        Command::Failed => {
            let failed = service.ledger().get_failed_synchronizations().await;
            if failed.is_empty() {
                println!("no failed synchronizations");
            }
            for status in &failed {
                print_status(status);
            }
        }
        Command::Stats => {
            let stats = service.ledger().get_sync_statistics().await;
            println!(
                "total={} successful={} failed={} pending={}",
                stats.total, stats.successful, stats.failed, stats.pending
            );
            if let Some(last) = stats.last_sync_date {
                println!("last sync: {}", last.to_rfc3339());
            }
            for (kind, count) in &stats.by_kind {
                println!("  {kind}: {count}");
            }
        }
        Command::Status { kind, id } => {
            print_status(&service.dispatcher().get_sync_status(kind, &id).await);
        }
        Command::History { kind, id } => {
            for result in service.ledger().get_sync_history(kind, &id).await {
                print_result(&result);
            }
        }
        Command::Recent { count } => {
            for result in service.ledger().get_recent_sync_results(count).await {
                print_result(&result);
            }
        }
        Command::Prune { older_than_days } => {
            let cutoff = prune_cutoff(Utc::now(), older_than_days)?;
            let removed = service.ledger().clear_sync_history(cutoff).await?;
            service.checkpoint().await?;
            println!("removed {removed} history entries older than {}", cutoff.to_rfc3339());
        }
        Command::OrderStatus {
            kind,
            order_id,
            status,
        } => {
            let result = service
                .dispatcher()
                .update_order_status(kind, order_id, status)
                .await?;
            print_result(&result);
            if !result.success {
                warn!(kind = %kind, order_id, "order status push failed");
            }
        }
    }

    Ok(())
}

fn prune_cutoff(now: DateTime<Utc>, older_than_days: i64) -> Result<DateTime<Utc>> {
    if older_than_days < 0 {
        return Err(anyhow!("--older-than-days must not be negative"));
    }
    Duration::try_days(older_than_days)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| anyhow!("--older-than-days {older_than_days} is out of range"))
}

/// `RUST_LOG` wins over `Logging.Filter`; both fall back to `info`.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| match config.logging.filter.as_deref() {
            Some(directive) => EnvFilter::try_new(directive),
            None => EnvFilter::try_new("info"),
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_status(status: &SyncStatus) {
    let last = status
        .last_sync_date
        .map(|date| date.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{} {} {} last_sync={} retries={}{}",
        status.entity_kind,
        status.entity_id,
        status.status,
        last,
        status.retry_count,
        status
            .last_error
            .as_deref()
            .map(|err| format!(" error={err}"))
            .unwrap_or_default()
    );
}

fn print_result(result: &SyncResult) {
    println!(
        "{} {} {} {}{}",
        result.sync_date.to_rfc3339(),
        result.entity_kind,
        result.entity_id,
        if result.success { "ok" } else { "failed" },
        result
            .error_message
            .as_deref()
            .map(|err| format!(" ({err})"))
            .unwrap_or_default()
    );
}
