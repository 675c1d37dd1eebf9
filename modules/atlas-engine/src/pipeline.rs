//! Single-item sequence: extract → scrape → enrich → generate → optimize →
//! assemble → persist. The caller (orchestrator) acquires the checkpoint
//! before this runs; terminal transitions happen here after persistence.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use atlas_common::WorkItem;

use crate::assembler::{self, WordTarget};
use crate::checkpoint::CheckpointStore;
use crate::enricher;
use crate::extractor::DataExtractor;
use crate::generator::ContentGenerator;
use crate::run_log::{EventKind, RunLog};
use crate::scraper::{ContentScraper, FetchStrategy};
use crate::seo;
use crate::store::ArtifactSink;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Succeeded { complete: bool },
    Failed { reason: String },
}

pub struct ItemPipeline {
    extractor: DataExtractor,
    scraper: ContentScraper,
    generator: ContentGenerator,
    sink: Arc<dyn ArtifactSink>,
    checkpoints: Arc<CheckpointStore>,
    run_log: Arc<Mutex<RunLog>>,
    roster: Vec<WorkItem>,
    word_target: WordTarget,
}

impl ItemPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: DataExtractor,
        scraper: ContentScraper,
        generator: ContentGenerator,
        sink: Arc<dyn ArtifactSink>,
        checkpoints: Arc<CheckpointStore>,
        run_log: Arc<Mutex<RunLog>>,
        roster: Vec<WorkItem>,
        word_target: WordTarget,
    ) -> Self {
        Self {
            extractor,
            scraper,
            generator,
            sink,
            checkpoints,
            run_log,
            roster,
            word_target,
        }
    }

    /// Run the full sequence for one acquired item. Never panics the
    /// batch: every failure path resolves to an outcome and a checkpoint
    /// transition (or, for persistence failures, a deliberate lack of one).
    pub async fn run(&self, item: &WorkItem) -> ItemOutcome {
        let started = Instant::now();

        let metrics = match self.extractor.extract(item).await {
            Ok(metrics) => metrics,
            Err(e) => return self.fail(item, &e.to_string()).await,
        };
        self.log(EventKind::MetricsExtracted {
            item: item.id.clone(),
            total_applications: metrics.total_applications,
        })
        .await;

        let scraped = self.scraper.scrape(item).await;
        self.log(EventKind::PageScraped {
            item: item.id.clone(),
            strategy: match scraped.strategy {
                Some(FetchStrategy::Primary) => "primary".to_string(),
                Some(FetchStrategy::Fallback) => "fallback".to_string(),
                None => "none".to_string(),
            },
            snippets: scraped.snippets.len() as u32,
        })
        .await;

        let ctx = enricher::enrich(item.clone(), metrics, scraped);

        let report = match self.generator.generate(&ctx).await {
            Ok(report) => report,
            Err(e) => return self.fail(item, &e.to_string()).await,
        };
        for section in &report.sections {
            self.log(EventKind::SectionGenerated {
                item: item.id.clone(),
                section: section.name.clone(),
                words: section.word_count,
                cost_cents: section.cost_cents,
                attempts: report.attempts.get(&section.name).copied().unwrap_or(1),
            })
            .await;
        }

        let seo = seo::optimize(&ctx, &report.sections, &self.roster);
        let artifact = assembler::assemble(
            &ctx,
            &report,
            seo,
            started.elapsed().as_millis() as u64,
            self.word_target,
        );

        if let Err(e) = self.sink.persist(&artifact).await {
            // Leave the record in_progress: the artifact was not written,
            // so the item must be recomputed, not marked failed-and-done.
            error!(item = %item.id, error = %e, "Persistence failed, leaving checkpoint in_progress");
            self.checkpoints.release(&item.id).await;
            let reason = e.to_string();
            self.log(EventKind::ItemFailed {
                item: item.id.clone(),
                reason: reason.clone(),
            })
            .await;
            return ItemOutcome::Failed { reason };
        }

        if let Err(e) = self.checkpoints.complete(&item.id, artifact.complete).await {
            error!(item = %item.id, error = %e, "Checkpoint transition failed after persistence");
            self.checkpoints.release(&item.id).await;
            return ItemOutcome::Failed {
                reason: format!("checkpoint write failed: {e}"),
            };
        }

        self.log(EventKind::ItemSucceeded {
            item: item.id.clone(),
            complete: artifact.complete,
            total_words: artifact.total_words,
            cost_cents: artifact.total_cost_cents,
        })
        .await;
        info!(
            item = %item.id,
            complete = artifact.complete,
            words = artifact.total_words,
            "Item finished"
        );

        ItemOutcome::Succeeded {
            complete: artifact.complete,
        }
    }

    async fn fail(&self, item: &WorkItem, reason: &str) -> ItemOutcome {
        if let Err(e) = self.checkpoints.fail(&item.id, reason).await {
            warn!(item = %item.id, error = %e, "Failed to record failure checkpoint");
        }
        self.log(EventKind::ItemFailed {
            item: item.id.clone(),
            reason: reason.to_string(),
        })
        .await;
        warn!(item = %item.id, reason, "Item failed");
        ItemOutcome::Failed {
            reason: reason.to_string(),
        }
    }

    async fn log(&self, kind: EventKind) {
        self.run_log.lock().await.log(kind);
    }
}
