//! Durable record store.
//!
//! Records are kept as JSON payloads keyed by `(EntityKind, natural key)` and persisted
//! through a [`Journal`]. Each watcher run works through its own [`Session`], and the
//! typed domain services in [`services`] sit on top of a session.

pub mod services;
pub mod session;

use crate::core::{EntityKind, Result, SyncError};
use crate::journal::{DurabilityMode, Journal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use services::{DomainServices, Managed, RecordService, ServiceScope, StoreScope, StoreService};
pub use session::{Session, SessionStats};

const JOURNAL_NAME: &str = "records";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub kind: EntityKind,
    pub key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum StoreOp {
    Put(StoredRecord),
}

type RecordKey = (EntityKind, String);

struct StoreState {
    records: BTreeMap<RecordKey, StoredRecord>,
    journal: Option<Journal>,
}

impl StoreState {
    fn apply(&mut self, op: StoreOp) {
        match op {
            StoreOp::Put(record) => {
                self.records
                    .insert((record.kind, record.key.clone()), record);
            }
        }
    }

    /// Journals `op`, applies it, then snapshots once enough ops have accumulated.
    /// The snapshot covers the op just appended, so it must be taken after `apply`.
    async fn commit(&mut self, op: StoreOp, snapshot_every_ops: u64) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&op).await?;
        }
        self.apply(op);

        let Self { records, journal } = self;
        if let Some(journal) = journal.as_mut() {
            if snapshot_every_ops > 0 && journal.ops_since_snapshot() >= snapshot_every_ops {
                let snapshot: Vec<&StoredRecord> = records.values().collect();
                journal.snapshot_and_compact(&snapshot).await?;
                debug!(records = snapshot.len(), "record store snapshot written");
            }
        }
        Ok(())
    }
}

pub struct RecordStore {
    state: Mutex<StoreState>,
    snapshot_every_ops: u64,
}

impl RecordStore {
    /// A store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState {
                records: BTreeMap::new(),
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
            Journal::open::<Vec<StoredRecord>, StoreOp>(data_dir.as_ref(), JOURNAL_NAME, durability)
                .await?;

        let mut state = StoreState {
            records: BTreeMap::new(),
            journal: Some(journal),
        };
        for record in recovered.snapshot.unwrap_or_default() {
            state.apply(StoreOp::Put(record));
        }
        let replayed = recovered.ops.len();
        for op in recovered.ops {
            state.apply(op);
        }
        info!(
            records = state.records.len(),
            replayed,
            "record store opened"
        );

        Ok(Self {
            state: Mutex::new(state),
            snapshot_every_ops,
        })
    }

    pub async fn get(&self, kind: EntityKind, key: &str) -> Option<StoredRecord> {
        let state = self.state.lock().await;
        state.records.get(&(kind, key.to_string())).cloned()
    }

    pub async fn contains(&self, kind: EntityKind, key: &str) -> bool {
        let state = self.state.lock().await;
        state.records.contains_key(&(kind, key.to_string()))
    }

    /// Inserts a new record; fails with `Conflict` when the key is taken.
    pub async fn insert(
        &self,
        kind: EntityKind,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<StoredRecord> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&(kind, key.to_string())) {
            return Err(SyncError::Conflict(format!("{kind} '{key}' already exists")));
        }
        let now = Utc::now();
        let record = StoredRecord {
            kind,
            key: key.to_string(),
            payload,
            created_at: now,
            modified_at: now,
            revision: 1,
        };
        self.write(&mut state, record).await
    }

    /// Replaces an existing record's payload; fails with `NotFound` when absent.
    pub async fn replace(
        &self,
        kind: EntityKind,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<StoredRecord> {
        let mut state = self.state.lock().await;
        let existing = state
            .records
            .get(&(kind, key.to_string()))
            .ok_or_else(|| SyncError::not_found(kind, key))?;
        let record = StoredRecord {
            kind,
            key: key.to_string(),
            payload,
            created_at: existing.created_at,
            modified_at: Utc::now(),
            revision: existing.revision.saturating_add(1),
        };
        self.write(&mut state, record).await
    }

    pub async fn count(&self, kind: EntityKind) -> usize {
        let state = self.state.lock().await;
        state.records.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Writes a snapshot and compacts the journal regardless of the op counter.
    pub async fn checkpoint(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let snapshot: Vec<StoredRecord> = state.records.values().cloned().collect();
        if let Some(journal) = state.journal.as_mut() {
            journal.snapshot_and_compact(&snapshot).await?;
        }
        Ok(())
    }

    async fn write(&self, state: &mut StoreState, record: StoredRecord) -> Result<StoredRecord> {
        state
            .commit(StoreOp::Put(record.clone()), self.snapshot_every_ops)
            .await?;
        Ok(record)
    }
}
