//! Final composition of sections, SEO metadata and aggregates into the
//! persisted page artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::enricher::EnrichedContext;
use crate::generator::GenerationReport;
use crate::scraper::FetchStrategy;
use crate::seo::SeoMetadata;

pub const SCHEMA_VERSION: u32 = 1;

/// Word-count target range for a full page. Landing outside it flags the
/// artifact but never blocks it.
#[derive(Debug, Clone, Copy)]
pub struct WordTarget {
    pub min: u32,
    pub max: u32,
}

/// The one durable output per work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageArtifact {
    pub schema_version: u32,
    pub item_id: String,
    pub item_name: String,
    pub sections: Vec<crate::generator::GeneratedSection>,
    /// Declared sections that could not be generated. Explicitly recorded,
    /// never silently absent.
    pub missing_sections: Vec<String>,
    pub seo: SeoMetadata,
    pub total_words: u32,
    pub total_cost_cents: u64,
    pub generation_ms: u64,
    pub scrape_strategy: Option<FetchStrategy>,
    /// False when optional sections are missing: terminal success, marked
    /// incomplete.
    pub complete: bool,
    pub below_word_target: bool,
    pub above_word_target: bool,
    pub generated_at: DateTime<Utc>,
}

pub fn assemble(
    ctx: &EnrichedContext,
    report: &GenerationReport,
    seo: SeoMetadata,
    generation_ms: u64,
    target: WordTarget,
) -> PageArtifact {
    let total_words: u32 = report.sections.iter().map(|s| s.word_count).sum();
    let below_word_target = total_words < target.min;
    if below_word_target {
        warn!(
            item = %ctx.item.id,
            total_words,
            min = target.min,
            "Page is below the word-count target"
        );
    }
    let above_word_target = total_words > target.max;
    if above_word_target {
        warn!(
            item = %ctx.item.id,
            total_words,
            max = target.max,
            "Page is above the word-count target"
        );
    }

    let artifact = PageArtifact {
        schema_version: SCHEMA_VERSION,
        item_id: ctx.item.id.clone(),
        item_name: ctx.item.name.clone(),
        sections: report.sections.clone(),
        missing_sections: report.missing.clone(),
        seo,
        total_words,
        total_cost_cents: report.cost_cents,
        generation_ms,
        scrape_strategy: ctx.scraped.strategy,
        complete: report.missing.is_empty(),
        below_word_target,
        above_word_target,
        generated_at: Utc::now(),
    };

    // Monitoring summary.
    info!(
        item = %artifact.item_id,
        sections = artifact.sections.len(),
        missing = artifact.missing_sections.len(),
        total_words,
        cost_cents = artifact.total_cost_cents,
        generation_ms,
        complete = artifact.complete,
        "Page assembled"
    );

    artifact
}
