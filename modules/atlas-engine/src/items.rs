//! Work-item enumeration. The authority roster lives in the analytical
//! store; a small compile-time seed list keeps dev environments and smoke
//! runs working without one.

use anyhow::Result;
use tracing::{info, warn};

use atlas_common::{SiteComplexity, WorkItem};

use crate::extractor::MetricsStore;

/// Enumerate the run's work-item set. Falls back to the seed roster when
/// the store has no active authorities.
pub async fn enumerate(store: &dyn MetricsStore) -> Result<Vec<WorkItem>> {
    let roster = store.roster().await?;
    if roster.is_empty() {
        warn!("Store returned an empty roster, using seed authorities");
        return Ok(seed_items());
    }
    info!(items = roster.len(), "Roster loaded");
    Ok(roster)
}

/// Compile-time seed roster.
pub fn seed_items() -> Vec<WorkItem> {
    fn item(
        id: &str,
        name: &str,
        tags: &[&str],
        estimated_records: u64,
        complexity: SiteComplexity,
        website: &str,
    ) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            estimated_records,
            complexity,
            website: Some(website.to_string()),
        }
    }

    vec![
        item(
            "bristol",
            "Bristol City Council",
            &["unitary", "metro"],
            4200,
            SiteComplexity::Complex,
            "https://www.bristol.gov.uk/residents/planning-and-building-regulations",
        ),
        item(
            "south-hams",
            "South Hams District Council",
            &["district", "rural", "coastal"],
            900,
            SiteComplexity::Simple,
            "https://www.southhams.gov.uk/planning",
        ),
        item(
            "york",
            "City of York Council",
            &["unitary", "conservation"],
            1600,
            SiteComplexity::Simple,
            "https://www.york.gov.uk/planning",
        ),
        item(
            "lake-district",
            "Lake District National Park Authority",
            &["national-park", "rural"],
            650,
            SiteComplexity::Simple,
            "https://www.lakedistrict.gov.uk/planning",
        ),
        item(
            "hackney",
            "London Borough of Hackney",
            &["district", "metro", "conservation"],
            3100,
            SiteComplexity::Complex,
            "https://hackney.gov.uk/planning",
        ),
    ]
}
