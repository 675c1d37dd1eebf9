//! SEO metadata derived from the assembled content. Pure; the only
//! degradation is thinner output when inputs are missing.

use serde::{Deserialize, Serialize};

use atlas_common::WorkItem;

use crate::enricher::EnrichedContext;
use crate::generator::GeneratedSection;

const MAX_DESCRIPTION_CHARS: usize = 160;
const MAX_RELATED_LINKS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedLink {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub title: String,
    pub description: String,
    /// schema.org-style block mirroring the key metrics.
    pub structured_data: serde_json::Value,
    pub related: Vec<RelatedLink>,
}

pub fn optimize(
    ctx: &EnrichedContext,
    sections: &[GeneratedSection],
    roster: &[WorkItem],
) -> SeoMetadata {
    let title = format!(
        "{} planning applications: statistics, trends and approval rates",
        ctx.item.name
    );

    let description = sections
        .iter()
        .find(|s| s.name == "overview")
        .map(|s| truncate_words(&s.text, MAX_DESCRIPTION_CHARS))
        .unwrap_or_else(|| {
            format!(
                "{} planning data: {} applications on record, {:.0}% approval rate.",
                ctx.item.name, ctx.metrics.total_applications, ctx.metrics.approval_rate_pct
            )
        });

    let structured_data = serde_json::json!({
        "@context": "https://schema.org",
        "@type": "Dataset",
        "name": title,
        "description": description,
        "variableMeasured": [
            { "name": "totalApplications", "value": ctx.metrics.total_applications },
            { "name": "applicationsLastYear", "value": ctx.metrics.applications_last_year },
            { "name": "approvalRatePct", "value": ctx.metrics.approval_rate_pct },
            { "name": "yoyChangePct", "value": ctx.metrics.yoy_change_pct },
        ],
    });

    SeoMetadata {
        title,
        description,
        structured_data,
        related: related_links(&ctx.item, roster),
    }
}

/// Cross links to authorities sharing a classification tag. Deterministic
/// order: highest estimated volume first, then id.
fn related_links(item: &WorkItem, roster: &[WorkItem]) -> Vec<RelatedLink> {
    let mut candidates: Vec<&WorkItem> = roster
        .iter()
        .filter(|other| other.id != item.id && item.shares_tag(other))
        .collect();
    candidates.sort_by(|a, b| {
        b.estimated_records
            .cmp(&a.estimated_records)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates
        .into_iter()
        .take(MAX_RELATED_LINKS)
        .map(|other| RelatedLink {
            id: other.id.clone(),
            name: other.name.clone(),
        })
        .collect()
}

/// Cut at the last whole word that fits.
fn truncate_words(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first_line.len() <= max_chars {
        return first_line.to_string();
    }
    let mut out = String::new();
    for word in first_line.split_whitespace() {
        if out.len() + word.len() + 1 > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
