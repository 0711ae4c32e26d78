use crate::core::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of one synchronization attempt. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub sync_date: DateTime<Utc>,
}

impl SyncResult {
    pub fn succeeded(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            entity_kind: kind,
            entity_id: id.into(),
            success: true,
            error_message: None,
            sync_date: Utc::now(),
        }
    }

    pub fn failed(kind: EntityKind, id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            entity_kind: kind,
            entity_id: id.into(),
            success: false,
            error_message: Some(error.into()),
            sync_date: Utc::now(),
        }
    }

    pub fn at(mut self, sync_date: DateTime<Utc>) -> Self {
        self.sync_date = sync_date;
        self
    }
}

/// A history row: the result plus its insertion sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub result: SyncResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pending",
            Self::Synced => "Synced",
            Self::Failed => "Failed",
        })
    }
}

/// Current synchronization state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub status: SyncState,
    pub last_sync_date: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn pending(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            entity_kind: kind,
            entity_id: id.into(),
            status: SyncState::Pending,
            last_sync_date: None,
            retry_count: 0,
            last_error: None,
        }
    }

    pub(crate) fn apply(&mut self, result: &SyncResult) {
        self.last_sync_date = Some(result.sync_date);
        if result.success {
            self.status = SyncState::Synced;
            self.retry_count = 0;
            self.last_error = None;
        } else {
            self.status = SyncState::Failed;
            self.retry_count = self.retry_count.saturating_add(1);
            self.last_error = result.error_message.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
    pub last_sync_date: Option<DateTime<Utc>>,
    pub by_kind: BTreeMap<EntityKind, usize>,
}
