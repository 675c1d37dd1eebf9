//! Long-form section generation. One model call per section so prompt size
//! stays bounded and a bad section cannot take the others down with it.
//! Every attempt is charged the moment its cost is known, before the
//! result is inspected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use atlas_common::AtlasError;
use model_client::{Prompt, TextModel};

use crate::budget::BudgetLedger;
use crate::checkpoint::CheckpointStore;
use crate::enricher::EnrichedContext;
use crate::retry::RetryPolicy;

/// Declared section list, in page order.
pub const DEFAULT_SECTIONS: &[&str] = &["overview", "trend-narrative", "policy-summary", "faq"];

/// Charge for an attempt that errored before usage was reported. The
/// provider billed compute for it either way; under-counting spend is
/// worse than over-counting by a cent.
const FAILED_ATTEMPT_COST_CENTS: u64 = 1;

const MAX_TOKENS_PER_SECTION: u32 = 1024;

const SYSTEM_PROMPT: &str = "You are a data journalist writing about local planning \
applications in plain, factual prose for a public statistics site. Write from the \
figures provided; never invent numbers. British English. No markdown headings.";

/// One named content block with its attributed cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub name: String,
    pub text: String,
    pub word_count: u32,
    pub cost_cents: u64,
}

/// What generation produced for one item, including what it could not.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub sections: Vec<GeneratedSection>,
    /// Optional sections that failed after retries.
    pub missing: Vec<String>,
    /// Model-call attempts consumed per section.
    pub attempts: HashMap<String, u32>,
    pub cost_cents: u64,
}

pub struct ContentGenerator {
    model: Arc<dyn TextModel>,
    ledger: Arc<BudgetLedger>,
    checkpoints: Arc<CheckpointStore>,
    retry: RetryPolicy,
    sections: Vec<String>,
    required: Vec<String>,
}

impl ContentGenerator {
    pub fn new(
        model: Arc<dyn TextModel>,
        ledger: Arc<BudgetLedger>,
        checkpoints: Arc<CheckpointStore>,
        retry: RetryPolicy,
        sections: Vec<String>,
        required: Vec<String>,
    ) -> Self {
        Self {
            model,
            ledger,
            checkpoints,
            retry,
            sections,
            required,
        }
    }

    /// Generate every declared section for one authority. A required
    /// section failing after retries fails the item; optional failures are
    /// recorded as missing and generation continues.
    pub async fn generate(&self, ctx: &EnrichedContext) -> Result<GenerationReport, AtlasError> {
        let mut report = GenerationReport {
            sections: Vec::new(),
            missing: Vec::new(),
            attempts: HashMap::new(),
            cost_cents: 0,
        };

        for section in &self.sections {
            let prompt = build_prompt(section, ctx);
            let item_id = ctx.item.id.as_str();

            // Actual cents charged across every attempt for this section,
            // including retried attempts billed at full price. Keeps the
            // report in lockstep with the ledger.
            let charged = AtomicU64::new(0);
            let outcome = self
                .retry
                .run(&format!("generate {section}"), |_| {
                    let prompt = prompt.clone();
                    let charged = &charged;
                    async move {
                        match self.model.generate(&prompt, MAX_TOKENS_PER_SECTION).await {
                            Ok(completion) => {
                                self.spend(item_id, completion.cost_cents).await;
                                charged.fetch_add(completion.cost_cents, Ordering::Relaxed);
                                if completion.text.trim().is_empty() {
                                    anyhow::bail!("Model returned an empty completion");
                                }
                                Ok(completion)
                            }
                            Err(e) => {
                                self.spend(item_id, FAILED_ATTEMPT_COST_CENTS).await;
                                charged.fetch_add(FAILED_ATTEMPT_COST_CENTS, Ordering::Relaxed);
                                Err(e)
                            }
                        }
                    }
                })
                .await;
            let charged = charged.into_inner();

            match outcome {
                Ok((completion, attempts)) => {
                    report.attempts.insert(section.clone(), attempts);
                    report.cost_cents += charged;
                    let word_count = completion.text.split_whitespace().count() as u32;
                    info!(
                        item = %ctx.item.id,
                        section = %section,
                        words = word_count,
                        cost_cents = completion.cost_cents,
                        attempts,
                        "Section generated"
                    );
                    report.sections.push(GeneratedSection {
                        name: section.clone(),
                        text: completion.text,
                        word_count,
                        cost_cents: completion.cost_cents,
                    });
                }
                Err(e) => {
                    report.attempts.insert(section.clone(), self.retry.max_attempts);
                    report.cost_cents += charged;
                    if self.required.iter().any(|r| r == section) {
                        return Err(AtlasError::GenerationFailed {
                            section: section.clone(),
                            cause: e.to_string(),
                        });
                    }
                    warn!(
                        item = %ctx.item.id,
                        section = %section,
                        error = %e,
                        "Optional section failed after retries, page will be incomplete"
                    );
                    report.missing.push(section.clone());
                }
            }
        }

        Ok(report)
    }

    /// Charge both the run ledger and the item's durable checkpoint record
    /// before the caller looks at the result.
    async fn spend(&self, item_id: &str, cost_cents: u64) {
        self.ledger.charge(cost_cents);
        if let Err(e) = self.checkpoints.record_spend(item_id, cost_cents).await {
            warn!(item = item_id, error = %e, "Failed to record spend on checkpoint");
        }
    }
}

// --- Prompt templates ---

/// Deterministic template keyed by section name. Same context in, same
/// prompt out.
fn build_prompt(section: &str, ctx: &EnrichedContext) -> Prompt {
    let instruction = match section {
        "overview" => {
            "Write an overview of planning application activity for this authority: \
             overall volume, how the last year compares, and the approval rate. \
             Two to three paragraphs."
        }
        "trend-narrative" => {
            "Describe how application volumes have moved month by month, naming the \
             busiest and quietest periods and the year-over-year direction. \
             Two paragraphs."
        }
        "policy-summary" => {
            "Summarise the local planning policy context using the reference notes \
             and any website extracts. Stick to what the material supports. \
             Two paragraphs."
        }
        "faq" => {
            "Write five frequently asked questions and answers a resident would have \
             about planning applications in this area, grounded in the figures. \
             Format each as a question line followed by an answer paragraph."
        }
        _ => "Write a short factual section for this authority's statistics page.",
    };

    Prompt::new(
        SYSTEM_PROMPT,
        format!(
            "Section: {section}\n\n{instruction}\n\n{}",
            context_block(ctx)
        ),
    )
}

fn context_block(ctx: &EnrichedContext) -> String {
    let m = &ctx.metrics;
    let mut block = format!(
        "Authority: {} ({})\n\
         Total applications on record: {}\n\
         Applications in the last 12 months: {}\n\
         Approval rate: {:.1}%\n\
         Year-over-year change: {:+.1}%\n",
        ctx.item.name,
        ctx.item.tags.join(", "),
        m.total_applications,
        m.applications_last_year,
        m.approval_rate_pct,
        m.yoy_change_pct,
    );

    if !m.monthly_trend.is_empty() {
        block.push_str("Monthly counts (oldest first): ");
        let series: Vec<String> = m
            .monthly_trend
            .iter()
            .map(|mc| format!("{}={}", mc.month, mc.count))
            .collect();
        block.push_str(&series.join(", "));
        block.push('\n');
    }
    if !m.top_categories.is_empty() {
        block.push_str("Top application categories: ");
        let cats: Vec<String> = m
            .top_categories
            .iter()
            .map(|c| format!("{} ({})", c.category, c.count))
            .collect();
        block.push_str(&cats.join(", "));
        block.push('\n');
    }
    for note in &ctx.reference_notes {
        block.push_str(&format!("Reference [{}]: {}\n", note.tag, note.note));
    }
    if !ctx.scraped.snippets.is_empty() {
        block.push_str("\nExtracts from the authority website:\n");
        for snippet in ctx.scraped.snippets.iter().take(6) {
            block.push_str(&format!("- {snippet}\n"));
        }
    }
    block
}
