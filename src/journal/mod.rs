//! Append-only JSON-lines journal with an atomically replaced snapshot file.
//!
//! Each durable component owns one `Journal` under the data directory:
//! `{name}.journal.jsonl` holds one `JournalRecord` per line and `{name}.snapshot.json`
//! holds the last compacted state. Recovery loads the snapshot and replays every
//! journal record whose `seq` is greater than the snapshot's `last_seq`.

use crate::core::{Result, SyncError};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurabilityMode {
    /// Every append is synced to disk before it is acknowledged.
    Strict,
    /// Appends are flushed immediately and synced at most every `sync_interval_ms`.
    Eventual { sync_interval_ms: u64 },
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::Strict
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord<Op> {
    pub seq: u64,
    pub ts_unix_ms: i64,
    pub op: Op,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile<S> {
    pub last_seq: u64,
    pub created_at_unix_ms: i64,
    pub state: S,
}

/// State found on disk when a journal is opened.
#[derive(Debug)]
pub struct Recovered<S, Op> {
    pub snapshot: Option<S>,
    pub ops: Vec<Op>,
}

#[derive(Debug)]
pub struct Journal {
    dir: PathBuf,
    name: String,
    durability: DurabilityMode,
    seq_next: u64,
    last_sync_unix_ms: i64,
    ops_since_snapshot: u64,
}

impl Journal {
    /// Opens (creating the directory if needed) and recovers the journal named `name`.
    pub async fn open<S, Op>(
        dir: impl AsRef<Path>,
        name: &str,
        durability: DurabilityMode,
    ) -> Result<(Self, Recovered<S, Op>)>
    where
        S: DeserializeOwned,
        Op: DeserializeOwned,
    {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let mut journal = Self {
            dir,
            name: name.to_string(),
            durability,
            seq_next: 1,
            last_sync_unix_ms: Utc::now().timestamp_millis(),
            ops_since_snapshot: 0,
        };

        let snapshot = journal.read_snapshot_file::<S>().await?;
        let last_seq = snapshot.as_ref().map(|s| s.last_seq).unwrap_or(0);
        let records = journal.read_records::<Op>(last_seq).await?;

        journal.seq_next = records
            .last()
            .map(|r| r.seq)
            .unwrap_or(last_seq)
            .saturating_add(1);
        journal.ops_since_snapshot = records.len() as u64;

        let recovered = Recovered {
            snapshot: snapshot.map(|s| s.state),
            ops: records.into_iter().map(|r| r.op).collect(),
        };
        Ok((journal, recovered))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.join(format!("{}.journal.jsonl", self.name))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(format!("{}.snapshot.json", self.name))
    }

    pub fn ops_since_snapshot(&self) -> u64 {
        self.ops_since_snapshot
    }

    /// Appends one operation and returns its sequence number.
    pub async fn append<Op: Serialize>(&mut self, op: &Op) -> Result<u64> {
        let seq = self.seq_next;
        self.seq_next = self.seq_next.saturating_add(1);

        let record = JournalRecord {
            seq,
            ts_unix_ms: Utc::now().timestamp_millis(),
            op,
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|err| SyncError::Journal(format!("serialize {} journal: {}", self.name, err)))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let now_ms = Utc::now().timestamp_millis();
        let due = match self.durability {
            DurabilityMode::Strict => true,
            DurabilityMode::Eventual { sync_interval_ms } => {
                now_ms - self.last_sync_unix_ms >= sync_interval_ms as i64
            }
        };
        if due {
            file.sync_data().await?;
            self.last_sync_unix_ms = now_ms;
        }

        self.ops_since_snapshot = self.ops_since_snapshot.saturating_add(1);
        Ok(seq)
    }

    /// Writes `state` as the new snapshot and drops the journal records it covers.
    pub async fn snapshot_and_compact<S: Serialize>(&mut self, state: &S) -> Result<()> {
        let last_seq = self.seq_next.saturating_sub(1);
        let snapshot = SnapshotFile {
            last_seq,
            created_at_unix_ms: Utc::now().timestamp_millis(),
            state,
        };
        self.write_snapshot_file(&snapshot).await?;
        self.compact(last_seq).await?;
        self.ops_since_snapshot = 0;
        Ok(())
    }

    async fn read_snapshot_file<S: DeserializeOwned>(&self) -> Result<Option<SnapshotFile<S>>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).await?;
        let snapshot = serde_json::from_slice::<SnapshotFile<S>>(&bytes)
            .map_err(|err| SyncError::Journal(format!("parse {} snapshot: {}", self.name, err)))?;
        Ok(Some(snapshot))
    }

    async fn write_snapshot_file<S: Serialize>(&self, snapshot: &SnapshotFile<&S>) -> Result<()> {
        let path = self.snapshot_path();
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| SyncError::Journal(format!("serialize {} snapshot: {}", self.name, err)))?;
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn read_records<Op: DeserializeOwned>(
        &self,
        greater_than_seq: u64,
    ) -> Result<Vec<JournalRecord<Op>>> {
        let path = self.journal_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new().read(true).open(&path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<JournalRecord<Op>>(&line).map_err(|err| {
                SyncError::Journal(format!("parse {} journal record: {}", self.name, err))
            })?;
            if record.seq > greater_than_seq {
                records.push(record);
            }
        }

        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    async fn compact(&self, keep_after_seq: u64) -> Result<()> {
        // Operations are opaque here; only the envelope is inspected.
        let retained = self
            .read_records::<serde_json::Value>(keep_after_seq)
            .await?;

        let journal_path = self.journal_path();
        let tmp_path = journal_path.with_extension("tmp");
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .await?;
        for record in retained {
            let line = serde_json::to_string(&record)?;
            tmp.write_all(line.as_bytes()).await?;
            tmp.write_all(b"\n").await?;
        }
        tmp.flush().await?;
        fs::rename(&tmp_path, &journal_path).await?;
        Ok(())
    }
}
