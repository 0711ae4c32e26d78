//! Application configuration loaded from a JSON settings file.
//!
//! Section and key names are PascalCase so existing `appsettings.json` files load
//! unchanged.

use crate::core::{EntityKind, Result, SyncError};
use crate::journal::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "appsettings.json";
pub const DEFAULT_FILE_PATTERN: &str = "*.xml";
pub const DEFAULT_CRON_SCHEDULE: &str = "*/5 * * * *";
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_WMS_BASE_URL: &str = "http://localhost:5000";

fn default_file_pattern() -> String {
    DEFAULT_FILE_PATTERN.to_string()
}

fn default_cron_schedule() -> Option<String> {
    Some(DEFAULT_CRON_SCHEDULE.to_string())
}

fn default_true() -> bool {
    true
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_RETRY_ATTEMPTS
}

fn default_processing_interval_minutes() -> u64 {
    5
}

fn default_retry_base_delay_millis() -> u64 {
    1000
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_probe_interval_seconds() -> u64 {
    5
}

fn default_wms_base_url() -> String {
    DEFAULT_WMS_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_sync_interval_millis() -> u64 {
    1000
}

fn default_snapshot_every_ops() -> u64 {
    128
}

/// One monitored directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WatcherConfig {
    pub name: String,
    pub directory_path: PathBuf,
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    /// `None` or an empty string means "fixed interval only".
    #[serde(default = "default_cron_schedule")]
    pub cron_schedule: Option<String>,
    pub file_type: EntityKind,
    #[serde(default = "default_true")]
    pub archive_processed_files: bool,
    #[serde(default)]
    pub archive_path: PathBuf,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
}

impl WatcherConfig {
    /// Create a watcher with default pattern, schedule and retry settings
    pub fn new(name: &str, directory_path: impl Into<PathBuf>, file_type: EntityKind) -> Self {
        Self {
            name: name.to_string(),
            directory_path: directory_path.into(),
            file_pattern: default_file_pattern(),
            cron_schedule: default_cron_schedule(),
            file_type,
            archive_processed_files: false,
            archive_path: PathBuf::new(),
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
        }
    }

    /// Set the glob pattern
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.file_pattern = pattern.to_string();
        self
    }

    /// Set the cron expression (empty disables cron)
    pub fn cron(mut self, expression: &str) -> Self {
        self.cron_schedule = Some(expression.to_string());
        self
    }

    /// Archive processed files into `path`
    pub fn archive_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_processed_files = true;
        self.archive_path = path.into();
        self
    }

    /// Set the number of retries after the first attempt
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// The cron expression, if one is configured.
    pub fn cron_expression(&self) -> Option<&str> {
        self.cron_schedule
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileProcessingConfig {
    #[serde(default)]
    pub file_watchers: Vec<WatcherConfig>,
    #[serde(default = "default_processing_interval_minutes")]
    pub processing_interval_minutes: u64,
    #[serde(default = "default_retry_base_delay_millis")]
    pub retry_base_delay_millis: u64,
    #[serde(default)]
    pub retry_sweep_interval_minutes: Option<u64>,
}

impl Default for FileProcessingConfig {
    fn default() -> Self {
        Self {
            file_watchers: Vec::new(),
            processing_interval_minutes: default_processing_interval_minutes(),
            retry_base_delay_millis: default_retry_base_delay_millis(),
            retry_sweep_interval_minutes: None,
        }
    }
}

impl FileProcessingConfig {
    pub fn processing_interval(&self) -> Duration {
        Duration::from_secs(self.processing_interval_minutes.max(1).saturating_mul(60))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_millis)
    }

    pub fn retry_sweep_interval(&self) -> Option<Duration> {
        self.retry_sweep_interval_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
    }
}

/// Readiness endpoint of the downstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_probe_interval_seconds")]
    pub probe_interval_seconds: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            health_path: default_health_path(),
            probe_interval_seconds: default_probe_interval_seconds(),
        }
    }
}

impl ApiSettings {
    pub fn health_url(&self) -> Option<String> {
        let base = self.base_url.as_deref()?.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        let path = self.health_path.trim_start_matches('/');
        Some(format!("{base}/{path}"))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_seconds.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WmsApiSettings {
    #[serde(default = "default_wms_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for WmsApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_wms_base_url(),
            api_key: String::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurabilitySetting {
    Strict,
    Eventual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageSettings {
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
    #[serde(default = "default_durability")]
    pub durability: DurabilitySetting,
    #[serde(default = "default_sync_interval_millis")]
    pub sync_interval_millis: u64,
    #[serde(default = "default_snapshot_every_ops")]
    pub snapshot_every_ops: u64,
}

fn default_durability() -> DurabilitySetting {
    DurabilitySetting::Strict
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            durability: default_durability(),
            sync_interval_millis: default_sync_interval_millis(),
            snapshot_every_ops: default_snapshot_every_ops(),
        }
    }
}

impl StorageSettings {
    pub fn durability_mode(&self) -> DurabilityMode {
        match self.durability {
            DurabilitySetting::Strict => DurabilityMode::Strict,
            DurabilitySetting::Eventual => DurabilityMode::Eventual {
                sync_interval_ms: self.sync_interval_millis,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingSettings {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    #[serde(default)]
    pub file_processing: FileProcessingConfig,
    #[serde(default)]
    pub api_settings: ApiSettings,
    #[serde(default)]
    pub wms_api: WmsApiSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text)
            .map_err(|err| SyncError::Config(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, writing a minimal configuration first when the file does not exist.
    pub async fn load_or_bootstrap(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "configuration file not found, writing a minimal one");
            Self::write_minimal(path).await?;
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| SyncError::Config(format!("read {}: {}", path.display(), err)))?;
        Self::from_json(&text)
    }

    async fn write_minimal(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&AppConfig::default())
            .map_err(|err| SyncError::Config(err.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for watcher in &self.file_processing.file_watchers {
            if watcher.name.trim().is_empty() {
                return Err(SyncError::Config("watcher name must not be empty".into()));
            }
            if !names.insert(watcher.name.as_str()) {
                return Err(SyncError::Config(format!(
                    "duplicate watcher name '{}'",
                    watcher.name
                )));
            }
            if watcher.directory_path.as_os_str().is_empty() {
                return Err(SyncError::Config(format!(
                    "watcher '{}' has no DirectoryPath",
                    watcher.name
                )));
            }
            glob::Pattern::new(&watcher.file_pattern).map_err(|err| {
                SyncError::Config(format!(
                    "watcher '{}' has an invalid FilePattern '{}': {}",
                    watcher.name, watcher.file_pattern, err
                ))
            })?;
        }
        Ok(())
    }

    pub fn watcher(&self, name: &str) -> Option<&WatcherConfig> {
        self.file_processing
            .file_watchers
            .iter()
            .find(|w| w.name == name)
    }
}
