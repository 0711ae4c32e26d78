use super::{RecordStore, StoredRecord};
use crate::core::{EntityKind, Result, SyncError};
use crate::model::Record;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub created: usize,
    pub updated: usize,
}

/// Scoped unit of work over the shared [`RecordStore`].
///
/// Writes go straight through to the store; the session only tracks what it did so a
/// run can report it when the scope ends.
pub struct Session {
    id: u64,
    store: Arc<RecordStore>,
    created: AtomicUsize,
    updated: AtomicUsize,
}

impl Session {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            store,
            created: AtomicUsize::new(0),
            updated: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
        }
    }

    pub async fn exists(&self, kind: EntityKind, id: &str) -> bool {
        self.store.contains(kind, id).await
    }

    pub async fn load<T: Record>(&self, key: &T::Key) -> Result<Option<T>> {
        match self.store.get(T::KIND, &key.to_string()).await {
            Some(stored) => decode(&stored).map(Some),
            None => Ok(None),
        }
    }

    pub async fn insert<T: Record>(&self, record: &T) -> Result<T> {
        let stored = self
            .store
            .insert(T::KIND, &record.entity_id(), encode(record)?)
            .await?;
        self.created.fetch_add(1, Ordering::Relaxed);
        decode(&stored)
    }

    pub async fn replace<T: Record>(&self, record: &T) -> Result<T> {
        let stored = self
            .store
            .replace(T::KIND, &record.entity_id(), encode(record)?)
            .await?;
        self.updated.fetch_add(1, Ordering::Relaxed);
        decode(&stored)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let stats = self.stats();
        debug!(
            session = self.id,
            created = stats.created,
            updated = stats.updated,
            "session closed"
        );
    }
}

fn encode<T: Record>(record: &T) -> Result<serde_json::Value> {
    serde_json::to_value(record)
        .map_err(|err| SyncError::Store(format!("encode {} '{}': {}", T::KIND, record.key(), err)))
}

fn decode<T: Record>(stored: &StoredRecord) -> Result<T> {
    serde_json::from_value(stored.payload.clone()).map_err(|err| {
        SyncError::Store(format!("decode {} '{}': {}", stored.kind, stored.key, err))
    })
}
