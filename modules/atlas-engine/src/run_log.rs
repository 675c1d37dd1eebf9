//! Per-run JSON timeline of every action taken during a batch run.
//!
//! Each run produces a single `{data_dir}/runs/{run_id}.json` file with an
//! ordered list of events — the operator-facing audit of what was fetched,
//! generated and spent.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::orchestrator::RunSummary;

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ItemStarted {
        item: String,
        attempt: u32,
    },
    ItemSkipped {
        item: String,
    },
    MetricsExtracted {
        item: String,
        total_applications: u64,
    },
    PageScraped {
        item: String,
        strategy: String,
        snippets: u32,
    },
    SectionGenerated {
        item: String,
        section: String,
        words: u32,
        cost_cents: u64,
        attempts: u32,
    },
    ItemSucceeded {
        item: String,
        complete: bool,
        total_words: u32,
        cost_cents: u64,
    },
    ItemFailed {
        item: String,
        reason: String,
    },
    BudgetCheckpoint {
        spent_cents: u64,
        remaining_cents: u64,
    },
}

impl RunLog {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Serialize the run log to JSON and write to disk.
    /// Returns the file path on success.
    pub fn save(&self, dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            summary,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    summary: &'a RunSummary,
    events: &'a [RunEvent],
}
