use serde::{Deserialize, Serialize};

/// How hard an authority's website is to scrape. Decided up front from the
/// authority roster so the paid rendering service is only ever tried for
/// sites known to need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteComplexity {
    /// Static or server-rendered site, plain HTTP fetch is enough.
    Simple,
    /// JS-heavy site, needs the remote rendering service when plain fetch
    /// comes back empty.
    Complex,
}

/// One unit of batch generation: a local planning authority we produce a
/// statistics page for. Immutable once enumerated for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable slug, e.g. "bristol-city-council".
    pub id: String,
    pub name: String,
    /// Classification tags, e.g. "unitary", "metro", "coastal". Drive
    /// reference-note lookup and related-page selection.
    pub tags: Vec<String>,
    /// Rough application volume from the roster. Used as the deterministic
    /// ranking metric for related-page links.
    pub estimated_records: u64,
    pub complexity: SiteComplexity,
    /// Authority website root, if known. Absence means no scraping.
    pub website: Option<String>,
}

impl WorkItem {
    pub fn shares_tag(&self, other: &WorkItem) -> bool {
        self.tags.iter().any(|t| other.tags.contains(t))
    }
}
