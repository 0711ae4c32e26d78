//! File processor: discovers a watcher's files, processes each under a retry policy
//! and disposes of it.
//!
//! One unit of work ([`DomainServices`] from a [`ServiceScope`]) is opened per watcher
//! run. A file that fails is isolated: its error is logged and the batch moves on.

pub mod archive;
pub mod handler;
pub mod retry;

use crate::config::{FileProcessingConfig, WatcherConfig};
use crate::core::{Result, SyncError};
use crate::dispatch::SyncMode;
use crate::parser::{self, ParseOutcome};
use crate::store::{DomainServices, ServiceScope};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use archive::{Disposition, archive_file_name};
pub use handler::{RecordHandler, RecordOutcome};
pub use retry::RetryPolicy;

/// Runs one pass of one watcher. The scheduler depends on this seam only.
#[async_trait]
pub trait WatcherRunner: Send + Sync {
    async fn run_watcher(&self, watcher: &WatcherConfig, cancel: &CancellationToken) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub records: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub sync_failures: usize,
    /// The parser found nothing usable (empty or malformed document).
    pub unreadable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherReport {
    pub watcher: String,
    pub discovered: usize,
    pub processed: usize,
    /// Files left in place after exhausting their retries.
    pub failed: usize,
    /// Files not started because of cancellation.
    pub not_started: usize,
}

pub struct FileProcessor {
    watchers: Vec<WatcherConfig>,
    retry_base_delay: Duration,
    scope: Arc<dyn ServiceScope>,
    handler: RecordHandler,
}

impl FileProcessor {
    pub fn new(
        config: &FileProcessingConfig,
        scope: Arc<dyn ServiceScope>,
        handler: RecordHandler,
    ) -> Self {
        Self {
            watchers: config.file_watchers.clone(),
            retry_base_delay: config.retry_base_delay(),
            scope,
            handler,
        }
    }

    /// Runs every configured watcher once, in order. A failing watcher is logged and
    /// does not stop the others.
    pub async fn process_all(&self, cancel: &CancellationToken) -> Vec<WatcherReport> {
        let mut reports = Vec::with_capacity(self.watchers.len());
        for watcher in &self.watchers {
            if cancel.is_cancelled() {
                info!("cancellation requested, not starting remaining watchers");
                break;
            }
            match self.process_watcher(watcher, cancel).await {
                Ok(report) => reports.push(report),
                Err(err) => error!(watcher = %watcher.name, error = %err, "watcher run failed"),
            }
        }
        reports
    }

    /// Runs one watcher once.
    pub async fn process_watcher(
        &self,
        watcher: &WatcherConfig,
        cancel: &CancellationToken,
    ) -> Result<WatcherReport> {
        let mut report = WatcherReport {
            watcher: watcher.name.clone(),
            ..WatcherReport::default()
        };

        let files = discover_files(watcher).await?;
        report.discovered = files.len();
        if files.is_empty() {
            debug!(watcher = %watcher.name, "no files to process");
            return Ok(report);
        }
        info!(watcher = %watcher.name, files = files.len(), "processing files");

        let services = self.scope.open_scope();
        let policy = RetryPolicy::for_watcher(watcher, self.retry_base_delay);

        for (index, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                report.not_started = files.len() - index;
                info!(
                    watcher = %watcher.name,
                    remaining = report.not_started,
                    "cancellation requested, stopping watcher run"
                );
                break;
            }

            let label = path.display().to_string();
            let outcome = policy
                .execute(&label, cancel, |_| self.process_file(watcher, path, &services))
                .await;

            match outcome {
                Ok(file_report) => {
                    debug!(watcher = %watcher.name, file = %label, ?file_report, "file processed");
                    if let Err(err) = archive::dispose(path, watcher, Utc::now()).await {
                        error!(
                            watcher = %watcher.name,
                            file = %label,
                            error = %err,
                            "unable to remove processed file"
                        );
                    }
                    report.processed += 1;
                }
                Err(SyncError::Cancelled) => {
                    warn!(
                        watcher = %watcher.name,
                        file = %label,
                        "retry abandoned on cancellation, file left in place"
                    );
                    report.failed += 1;
                }
                Err(err) => {
                    error!(
                        watcher = %watcher.name,
                        file = %label,
                        attempts = policy.max_retries + 1,
                        error = %err,
                        "file failed after all retries, leaving it in place"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            watcher = %watcher.name,
            processed = report.processed,
            failed = report.failed,
            "watcher run finished"
        );
        Ok(report)
    }

    /// One attempt at one file: read, parse, upsert and sync every record.
    async fn process_file(
        &self,
        watcher: &WatcherConfig,
        path: &Path,
        services: &DomainServices,
    ) -> Result<FileReport> {
        let text = fs::read_to_string(path).await?;
        let outcome = parser::parse_file(watcher.file_type, &text);

        let mut report = FileReport {
            unreadable: matches!(outcome, ParseOutcome::Empty | ParseOutcome::Invalid { .. }),
            ..FileReport::default()
        };
        if let ParseOutcome::Invalid { reason } = &outcome {
            warn!(
                watcher = %watcher.name,
                file = %path.display(),
                reason = %reason,
                "file has no usable records"
            );
        }

        for record in outcome.into_records() {
            report.records += 1;
            match self.handler.handle(services, record).await? {
                RecordOutcome::Applied { mode, synced } => {
                    match mode {
                        SyncMode::Created => report.created += 1,
                        SyncMode::Updated => report.updated += 1,
                    }
                    if !synced {
                        report.sync_failures += 1;
                    }
                }
                RecordOutcome::Skipped => report.skipped += 1,
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl WatcherRunner for FileProcessor {
    async fn run_watcher(&self, watcher: &WatcherConfig, cancel: &CancellationToken) -> Result<()> {
        self.process_watcher(watcher, cancel).await.map(|_| ())
    }
}

/// Files in the watcher's directory matching its pattern, sorted by name.
/// A missing directory yields no files.
pub async fn discover_files(watcher: &WatcherConfig) -> Result<Vec<PathBuf>> {
    let dir = &watcher.directory_path;
    if !fs::try_exists(dir).await.unwrap_or(false) {
        warn!(watcher = %watcher.name, directory = %dir.display(), "watch directory does not exist");
        return Ok(Vec::new());
    }

    let pattern = glob::Pattern::new(&watcher.file_pattern).map_err(|err| {
        SyncError::Config(format!(
            "watcher '{}' has an invalid FilePattern: {}",
            watcher.name, err
        ))
    })?;

    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if pattern.matches(&name.to_string_lossy()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
