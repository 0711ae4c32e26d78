//! Sync ledger: append-only result history plus one current status per entity.
//!
//! All reads and writes go through a single async mutex, so the status
//! read-modify-write of one `(kind, id)` can never interleave with another write to
//! the same entity. Writes are journaled before they are applied in memory.

pub mod types;

use crate::core::{EntityKind, Result};
use crate::journal::{DurabilityMode, Journal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use types::{LedgerEntry, SyncResult, SyncState, SyncStatistics, SyncStatus};

const JOURNAL_NAME: &str = "sync-ledger";

/// Default size of [`SyncLedger::get_recent_sync_results`] callers.
pub const DEFAULT_RECENT_RESULTS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum LedgerOp {
    Recorded(LedgerEntry),
    MarkedPending {
        entity_kind: EntityKind,
        entity_id: String,
    },
    Pruned {
        removed: Vec<u64>,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    next_seq: u64,
    history: Vec<LedgerEntry>,
    statuses: Vec<SyncStatus>,
}

type StatusKey = (EntityKind, String);

#[derive(Default)]
struct LedgerState {
    next_seq: u64,
    history: Vec<LedgerEntry>,
    statuses: BTreeMap<StatusKey, SyncStatus>,
}

impl LedgerState {
    fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            next_seq: snapshot.next_seq,
            history: snapshot.history,
            statuses: snapshot
                .statuses
                .into_iter()
                .map(|s| ((s.entity_kind, s.entity_id.clone()), s))
                .collect(),
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            next_seq: self.next_seq,
            history: self.history.clone(),
            statuses: self.statuses.values().cloned().collect(),
        }
    }

    fn apply(&mut self, op: LedgerOp) {
        match op {
            LedgerOp::Recorded(entry) => {
                let key = (entry.result.entity_kind, entry.result.entity_id.clone());
                self.statuses
                    .entry(key)
                    .or_insert_with(|| {
                        SyncStatus::pending(entry.result.entity_kind, &entry.result.entity_id)
                    })
                    .apply(&entry.result);
                self.next_seq = self.next_seq.max(entry.seq.saturating_add(1));
                self.history.push(entry);
            }
            LedgerOp::MarkedPending {
                entity_kind,
                entity_id,
            } => {
                let key = (entity_kind, entity_id.clone());
                self.statuses
                    .entry(key)
                    .and_modify(|s| s.status = SyncState::Pending)
                    .or_insert_with(|| SyncStatus::pending(entity_kind, entity_id));
            }
            LedgerOp::Pruned { removed } => {
                let removed: HashSet<u64> = removed.into_iter().collect();
                self.history.retain(|e| !removed.contains(&e.seq));
            }
        }
    }

    /// Entries older than `cutoff`, excluding the newest entry of each entity.
    fn prunable(&self, cutoff: DateTime<Utc>) -> Vec<u64> {
        let mut newest: BTreeMap<(EntityKind, &str), (DateTime<Utc>, u64)> = BTreeMap::new();
        for entry in &self.history {
            let key = (entry.result.entity_kind, entry.result.entity_id.as_str());
            let candidate = (entry.result.sync_date, entry.seq);
            newest
                .entry(key)
                .and_modify(|current| {
                    if candidate > *current {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }

        self.history
            .iter()
            .filter(|e| e.result.sync_date < cutoff)
            .filter(|e| {
                let key = (e.result.entity_kind, e.result.entity_id.as_str());
                newest.get(&key).map(|(_, seq)| *seq) != Some(e.seq)
            })
            .map(|e| e.seq)
            .collect()
    }
}

struct LedgerInner {
    state: LedgerState,
    journal: Option<Journal>,
}

pub struct SyncLedger {
    inner: Mutex<LedgerInner>,
    snapshot_every_ops: u64,
}

impl SyncLedger {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                state: LedgerState::default(),
                journal: None,
            }),
            snapshot_every_ops: 0,
        }
    }

    pub async fn open(
        data_dir: impl AsRef<Path>,
        durability: DurabilityMode,
        snapshot_every_ops: u64,
    ) -> Result<Self> {
        let (journal, recovered) =
            Journal::open::<LedgerSnapshot, LedgerOp>(data_dir.as_ref(), JOURNAL_NAME, durability)
                .await?;

        let mut state = LedgerState::from_snapshot(recovered.snapshot.unwrap_or_default());
        let replayed = recovered.ops.len();
        for op in recovered.ops {
            state.apply(op);
        }
        info!(
            history = state.history.len(),
            statuses = state.statuses.len(),
            replayed,
            "sync ledger opened"
        );

        Ok(Self {
            inner: Mutex::new(LedgerInner {
                state,
                journal: Some(journal),
            }),
            snapshot_every_ops,
        })
    }

    /// Appends `result` to the history and upserts the entity's status.
    pub async fn record_sync_result(&self, result: &SyncResult) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = LedgerEntry {
            seq: inner.state.next_seq,
            result: result.clone(),
        };
        self.commit(&mut inner, LedgerOp::Recorded(entry)).await
    }

    /// Marks an entity as being synchronized; keeps its failure count.
    pub async fn mark_pending(&self, kind: EntityKind, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.commit(
            &mut inner,
            LedgerOp::MarkedPending {
                entity_kind: kind,
                entity_id: id.to_string(),
            },
        )
        .await
    }

    pub async fn get_sync_status(&self, kind: EntityKind, id: &str) -> Option<SyncStatus> {
        let inner = self.inner.lock().await;
        inner.state.statuses.get(&(kind, id.to_string())).cloned()
    }

    /// Failed statuses, longest-failing first.
    pub async fn get_failed_synchronizations(&self) -> Vec<SyncStatus> {
        let inner = self.inner.lock().await;
        let mut failed: Vec<SyncStatus> = inner
            .state
            .statuses
            .values()
            .filter(|s| s.status == SyncState::Failed)
            .cloned()
            .collect();
        // `None` sorts before any date.
        failed.sort_by(|a, b| {
            a.last_sync_date
                .cmp(&b.last_sync_date)
                .then_with(|| a.entity_kind.cmp(&b.entity_kind))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        failed
    }

    /// History of one entity, newest first.
    pub async fn get_sync_history(&self, kind: EntityKind, id: &str) -> Vec<SyncResult> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&LedgerEntry> = inner
            .state
            .history
            .iter()
            .filter(|e| e.result.entity_kind == kind && e.result.entity_id == id)
            .collect();
        entries.sort_by(|a, b| newest_first(a, b));
        entries.into_iter().map(|e| e.result.clone()).collect()
    }

    /// The `count` most recent results across all entities, newest first.
    pub async fn get_recent_sync_results(&self, count: usize) -> Vec<SyncResult> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&LedgerEntry> = inner.state.history.iter().collect();
        entries.sort_by(|a, b| newest_first(a, b));
        entries
            .into_iter()
            .take(count)
            .map(|e| e.result.clone())
            .collect()
    }

    pub async fn get_sync_statistics(&self) -> SyncStatistics {
        let inner = self.inner.lock().await;
        let mut stats = SyncStatistics::default();
        for entry in &inner.state.history {
            stats.total += 1;
            if entry.result.success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            *stats.by_kind.entry(entry.result.entity_kind).or_insert(0) += 1;
            stats.last_sync_date = stats.last_sync_date.max(Some(entry.result.sync_date));
        }
        stats.pending = inner
            .state
            .statuses
            .values()
            .filter(|s| s.status == SyncState::Pending)
            .count();
        stats
    }

    /// Deletes history older than `older_than`, keeping the newest row of every entity.
    /// Returns the number of rows removed.
    pub async fn clear_sync_history(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let removed = inner.state.prunable(older_than);
        let count = removed.len();
        if count > 0 {
            self.commit(&mut inner, LedgerOp::Pruned { removed }).await?;
        }
        info!(removed = count, cutoff = %older_than, "sync history pruned");
        Ok(count)
    }

    pub async fn checkpoint(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let snapshot = inner.state.snapshot();
        if let Some(journal) = inner.journal.as_mut() {
            journal.snapshot_and_compact(&snapshot).await?;
        }
        Ok(())
    }

    async fn commit(&self, inner: &mut LedgerInner, op: LedgerOp) -> Result<()> {
        if let Some(journal) = inner.journal.as_mut() {
            journal.append(&op).await?;
        }
        inner.state.apply(op);

        if let Some(journal) = inner.journal.as_mut() {
            if self.snapshot_every_ops > 0 && journal.ops_since_snapshot() >= self.snapshot_every_ops
            {
                journal.snapshot_and_compact(&inner.state.snapshot()).await?;
                debug!("sync ledger snapshot written");
            }
        }
        Ok(())
    }
}

fn newest_first(a: &LedgerEntry, b: &LedgerEntry) -> std::cmp::Ordering {
    b.result
        .sync_date
        .cmp(&a.result.sync_date)
        .then_with(|| b.seq.cmp(&a.seq))
}
