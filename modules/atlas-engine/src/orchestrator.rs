//! Batch orchestration: bounded-concurrency fan-out over the work-item
//! set, budget-gated admission, resume-aware skipping, and operator
//! cancellation. Only the budget gate and explicit cancellation can end a
//! batch early; per-item failures never do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use atlas_common::WorkItem;

use crate::budget::BudgetLedger;
use crate::checkpoint::CheckpointStore;
use crate::pipeline::{ItemOutcome, ItemPipeline};
use crate::run_log::{EventKind, RunLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every admissible item ran to a terminal state.
    Completed,
    /// Admission halted on the budget gate; in-flight items finished.
    BudgetExhausted,
    /// Operator cancellation; in-flight items finished.
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: BatchOutcome,
    pub processed: u32,
    pub succeeded: u32,
    pub incomplete: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Items never admitted this run (budget halt, limit, or abort).
    pub pending: u32,
    pub failures: Vec<ItemFailure>,
    pub spent_cents: u64,
    pub remaining_cents: Option<u64>,
}

impl RunSummary {
    pub fn new(outcome: BatchOutcome) -> Self {
        Self {
            outcome,
            processed: 0,
            succeeded: 0,
            incomplete: 0,
            failed: 0,
            skipped: 0,
            pending: 0,
            failures: Vec::new(),
            spent_cents: 0,
            remaining_cents: None,
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Batch Run Complete ===")?;
        writeln!(f, "Outcome:     {:?}", self.outcome)?;
        writeln!(f, "Processed:   {}", self.processed)?;
        writeln!(f, "Succeeded:   {}", self.succeeded)?;
        writeln!(f, "Incomplete:  {}", self.incomplete)?;
        writeln!(f, "Failed:      {}", self.failed)?;
        writeln!(f, "Skipped:     {}", self.skipped)?;
        writeln!(f, "Pending:     {}", self.pending)?;
        writeln!(f, "Spent:       {} cents", self.spent_cents)?;
        if let Some(remaining) = self.remaining_cents {
            writeln!(f, "Remaining:   {remaining} cents")?;
        }
        for failure in &self.failures {
            writeln!(f, "  failed {}: {}", failure.item, failure.reason)?;
        }
        Ok(())
    }
}

pub struct BatchOrchestrator {
    pipeline: Arc<ItemPipeline>,
    checkpoints: Arc<CheckpointStore>,
    ledger: Arc<BudgetLedger>,
    run_log: Arc<Mutex<RunLog>>,
    concurrency: usize,
    item_estimate_cents: u64,
    cancel: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    pub fn new(
        pipeline: Arc<ItemPipeline>,
        checkpoints: Arc<CheckpointStore>,
        ledger: Arc<BudgetLedger>,
        run_log: Arc<Mutex<RunLog>>,
        concurrency: usize,
        item_estimate_cents: u64,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pipeline,
            checkpoints,
            ledger,
            run_log,
            concurrency: concurrency.max(1),
            item_estimate_cents,
            cancel,
        }
    }

    /// Run the batch over `items`. `limit` caps admissions for smoke runs.
    /// Re-invocation with the same checkpoint store is resume: done items
    /// are skipped, failed and stale in_progress ones are recomputed.
    pub async fn run(&self, items: &[WorkItem], limit: Option<usize>) -> Result<RunSummary> {
        let mut summary = RunSummary::new(BatchOutcome::Completed);
        let mut in_flight = FuturesUnordered::new();
        let mut admitted: u32 = 0;

        info!(items = items.len(), ?limit, "Batch run starting");

        for item in items {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Cancellation requested, halting admission");
                summary.outcome = BatchOutcome::Aborted;
                break;
            }
            if let Some(limit) = limit {
                if admitted as usize >= limit {
                    break;
                }
            }
            if self.checkpoints.is_done(&item.id).await {
                self.log(EventKind::ItemSkipped {
                    item: item.id.clone(),
                })
                .await;
                summary.skipped += 1;
                continue;
            }
            if !self.ledger.try_reserve(self.item_estimate_cents) {
                info!(
                    spent_cents = self.ledger.total_spent(),
                    estimate_cents = self.item_estimate_cents,
                    "Budget gate closed, halting admission"
                );
                summary.outcome = BatchOutcome::BudgetExhausted;
                break;
            }
            if !self.checkpoints.acquire(&item.id).await? {
                // Raced with a concurrent holder; not ours to run.
                self.ledger.settle(self.item_estimate_cents);
                summary.skipped += 1;
                continue;
            }

            let attempt = self
                .checkpoints
                .get(&item.id)
                .await
                .map(|r| r.attempt_count)
                .unwrap_or(1);
            self.log(EventKind::ItemStarted {
                item: item.id.clone(),
                attempt,
            })
            .await;

            admitted += 1;
            let pipeline = self.pipeline.clone();
            let ledger = self.ledger.clone();
            let estimate = self.item_estimate_cents;
            let item = item.clone();
            in_flight.push(async move {
                let outcome = pipeline.run(&item).await;
                ledger.settle(estimate);
                (item.id.clone(), outcome)
            });

            if in_flight.len() >= self.concurrency {
                if let Some((id, outcome)) = in_flight.next().await {
                    self.tally(&mut summary, &id, outcome).await;
                }
            }
        }

        // Drain: in-flight items always run to completion, even on budget
        // halt or cancellation.
        while let Some((id, outcome)) = in_flight.next().await {
            self.tally(&mut summary, &id, outcome).await;
        }

        summary.processed = admitted;
        summary.pending = (items.len() as u32)
            .saturating_sub(summary.skipped)
            .saturating_sub(admitted);
        summary.spent_cents = self.ledger.total_spent();
        summary.remaining_cents = self.ledger.is_metered().then(|| self.ledger.remaining());

        self.log(EventKind::BudgetCheckpoint {
            spent_cents: self.ledger.total_spent(),
            remaining_cents: self.ledger.remaining(),
        })
        .await;
        self.ledger.log_status();
        info!(outcome = ?summary.outcome, processed = summary.processed, "Batch run finished");

        Ok(summary)
    }

    async fn tally(&self, summary: &mut RunSummary, id: &str, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded { complete: true } => summary.succeeded += 1,
            ItemOutcome::Succeeded { complete: false } => summary.incomplete += 1,
            ItemOutcome::Failed { reason } => {
                summary.failed += 1;
                summary.failures.push(ItemFailure {
                    item: id.to_string(),
                    reason,
                });
            }
        }
    }

    async fn log(&self, kind: EventKind) {
        self.run_log.lock().await.log(kind);
    }
}
