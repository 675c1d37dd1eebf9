//! Durable per-item progress records — the sole source of truth for
//! "already done" across process restarts.
//!
//! One JSON file per work item under `{data_dir}/checkpoints/`. Writes go
//! through a temp file and rename so a crash mid-write never corrupts a
//! record. The in-memory map is only a cache of what is on disk.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Succeeded,
    /// Terminal success with one or more optional sections missing.
    Incomplete,
    Failed { reason: String },
}

impl ItemStatus {
    /// Done items are skipped on resume. An in_progress record left over
    /// from a crash is NOT done — it gets recomputed from scratch.
    pub fn is_done(&self) -> bool {
        matches!(self, ItemStatus::Succeeded | ItemStatus::Incomplete)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: String,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub attempt_count: u32,
    pub cost_spent_cents: u64,
    pub updated_at: DateTime<Utc>,
}

struct Inner {
    records: HashMap<String, CheckpointRecord>,
    /// Items acquired by a pipeline in this process. Guards the
    /// one-in_progress-per-item invariant within a run; stale in_progress
    /// records loaded at startup are not in this set and stay acquirable.
    held: HashSet<String>,
}

pub struct CheckpointStore {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

impl CheckpointStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create checkpoint dir {}", dir.display()))?;

        let mut records = HashMap::new();
        let mut stale = 0u32;
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<CheckpointRecord>(&raw) {
                Ok(record) => {
                    if record.status == ItemStatus::InProgress {
                        stale += 1;
                    }
                    records.insert(record.id.clone(), record);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }
        if stale > 0 {
            info!(stale, "Found in_progress checkpoints from an interrupted run, will retry them");
        }
        info!(dir = %dir.display(), records = records.len(), "Checkpoint store opened");

        Ok(Self {
            dir,
            inner: Mutex::new(Inner {
                records,
                held: HashSet::new(),
            }),
        })
    }

    pub async fn get(&self, id: &str) -> Option<CheckpointRecord> {
        self.inner.lock().await.records.get(id).cloned()
    }

    /// Whether an item is terminally done and should be skipped on resume.
    pub async fn is_done(&self, id: &str) -> bool {
        self.inner
            .lock()
            .await
            .records
            .get(id)
            .map(|r| r.status.is_done())
            .unwrap_or(false)
    }

    /// Spend recorded across all items, including crashed attempts. Partial
    /// spend from an interrupted run is a sunk cost but stays on the books.
    pub async fn recorded_spend(&self) -> u64 {
        self.inner
            .lock()
            .await
            .records
            .values()
            .map(|r| r.cost_spent_cents)
            .sum()
    }

    /// Atomically take exclusive ownership of an item and mark it
    /// in_progress. Returns false if the item is already done or held by
    /// another pipeline in this process.
    pub async fn acquire(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.held.contains(id) {
            return Ok(false);
        }
        if let Some(existing) = inner.records.get(id) {
            if existing.status.is_done() {
                return Ok(false);
            }
        }
        let record = inner
            .records
            .entry(id.to_string())
            .or_insert_with(|| CheckpointRecord {
                id: id.to_string(),
                status: ItemStatus::Pending,
                attempt_count: 0,
                cost_spent_cents: 0,
                updated_at: Utc::now(),
            });
        record.status = ItemStatus::InProgress;
        record.attempt_count += 1;
        record.updated_at = Utc::now();
        let snapshot = record.clone();
        self.write_record(&snapshot)?;
        inner.held.insert(id.to_string());
        Ok(true)
    }

    /// Transition a held item to its terminal success state.
    pub async fn complete(&self, id: &str, all_sections: bool) -> Result<()> {
        let status = if all_sections {
            ItemStatus::Succeeded
        } else {
            ItemStatus::Incomplete
        };
        self.transition(id, status).await
    }

    /// Transition a held item to failed with a reason.
    pub async fn fail(&self, id: &str, reason: &str) -> Result<()> {
        self.transition(
            id,
            ItemStatus::Failed {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Leave a held item in_progress on disk but release the in-process
    /// hold, so a later run (or a retry pass) can pick it up. Used when
    /// artifact persistence fails.
    pub async fn release(&self, id: &str) {
        self.inner.lock().await.held.remove(id);
    }

    /// Add to an item's durable spend total. Recorded before outcomes are
    /// known so a crash cannot lose paid-for work from the books.
    pub async fn record_spend(&self, id: &str, cost_cents: u64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(id) else {
            anyhow::bail!("No checkpoint record for {id}");
        };
        record.cost_spent_cents += cost_cents;
        record.updated_at = Utc::now();
        let snapshot = record.clone();
        self.write_record(&snapshot)
    }

    /// Drop terminal-success records so items regenerate (`--force`).
    pub async fn reset_done(&self) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        let done: Vec<String> = inner
            .records
            .values()
            .filter(|r| r.status.is_done())
            .map(|r| r.id.clone())
            .collect();
        for id in &done {
            inner.records.remove(id);
            let path = self.record_path(id);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove checkpoint {}", path.display()))?;
            }
        }
        Ok(done.len() as u32)
    }

    async fn transition(&self, id: &str, status: ItemStatus) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(id) else {
            anyhow::bail!("No checkpoint record for {id}");
        };
        record.status = status;
        record.updated_at = Utc::now();
        let snapshot = record.clone();
        self.write_record(&snapshot)?;
        inner.held.remove(id);
        Ok(())
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn write_record(&self, record: &CheckpointRecord) -> Result<()> {
        let path = self.record_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(record)?)
            .with_context(|| format!("Failed to write checkpoint {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to commit checkpoint {}", path.display()))?;
        Ok(())
    }
}
