//! Pure merge of extracted metrics, scraped content, and static reference
//! notes keyed by classification tags. No external calls; unknown tags are
//! simply omitted.

use serde::{Deserialize, Serialize};

use atlas_common::WorkItem;

use crate::extractor::ExtractedMetrics;
use crate::scraper::ScrapedContent;

/// Domain context attached per classification tag. Compile-time table,
/// same idea as a city profile: editorial facts the model should lean on.
const REFERENCE_NOTES: &[(&str, &str)] = &[
    (
        "unitary",
        "Unitary authorities handle all local planning functions themselves, \
         with no county-level tier above them.",
    ),
    (
        "district",
        "District councils decide most local applications, while county \
         matters such as minerals and waste sit with the county council.",
    ),
    (
        "metro",
        "Metropolitan areas see high volumes of householder extensions and \
         change-of-use applications driven by housing pressure.",
    ),
    (
        "rural",
        "Rural authorities weigh agricultural buildings, barn conversions \
         and countryside protection policies heavily in decisions.",
    ),
    (
        "coastal",
        "Coastal authorities apply additional flood-risk and erosion \
         constraints to applications near the shoreline.",
    ),
    (
        "national-park",
        "Development inside a national park faces stricter design and \
         landscape-impact tests than the national baseline.",
    ),
    (
        "conservation",
        "A high share of conservation areas and listed buildings means many \
         applications need heritage assessments.",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceNote {
    pub tag: String,
    pub note: String,
}

/// Immutable input to generation: everything known about one authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedContext {
    pub item: WorkItem,
    pub metrics: ExtractedMetrics,
    pub scraped: ScrapedContent,
    pub reference_notes: Vec<ReferenceNote>,
}

/// Deterministic; the only degradation is a tag with no reference note,
/// which is dropped rather than erroring.
pub fn enrich(item: WorkItem, metrics: ExtractedMetrics, scraped: ScrapedContent) -> EnrichedContext {
    let reference_notes = item
        .tags
        .iter()
        .filter_map(|tag| {
            REFERENCE_NOTES
                .iter()
                .find(|(t, _)| t == tag)
                .map(|(t, note)| ReferenceNote {
                    tag: t.to_string(),
                    note: note.to_string(),
                })
        })
        .collect();

    EnrichedContext {
        item,
        metrics,
        scraped,
        reference_notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::work_item;

    #[test]
    fn known_tags_attach_notes_in_tag_order() {
        let item = work_item("bristol", &["unitary", "metro"]);
        let ctx = enrich(item, ExtractedMetrics::default(), ScrapedContent::empty());
        let tags: Vec<&str> = ctx.reference_notes.iter().map(|n| n.tag.as_str()).collect();
        assert_eq!(tags, vec!["unitary", "metro"]);
    }

    #[test]
    fn unknown_tags_degrade_to_omission() {
        let item = work_item("atlantis", &["underwater", "coastal"]);
        let ctx = enrich(item, ExtractedMetrics::default(), ScrapedContent::empty());
        assert_eq!(ctx.reference_notes.len(), 1);
        assert_eq!(ctx.reference_notes[0].tag, "coastal");
    }

    #[test]
    fn no_tags_means_no_notes() {
        let ctx = enrich(
            work_item("plain", &[]),
            ExtractedMetrics::default(),
            ScrapedContent::empty(),
        );
        assert!(ctx.reference_notes.is_empty());
    }
}
