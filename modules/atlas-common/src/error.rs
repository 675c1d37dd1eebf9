use thiserror::Error;

#[derive(Error, Debug)]
pub enum AtlasError {
    /// The analytical store is unreachable or a query failed outright.
    /// An authority with zero records is NOT this error.
    #[error("Data store unavailable: {0}")]
    DataUnavailable(String),

    /// Scraping produced nothing usable. Never fatal to the pipeline.
    #[error("Scrape failed for {url}: {reason}")]
    ScrapeFailed { url: String, reason: String },

    /// A content section could not be generated after retries.
    #[error("Generation failed for section '{section}': {cause}")]
    GenerationFailed { section: String, cause: String },

    /// Run-level halt: the spend ceiling leaves no room for more items.
    #[error("Budget exhausted: spent {spent_cents} of {ceiling_cents} cents")]
    BudgetExhausted {
        spent_cents: u64,
        ceiling_cents: u64,
    },

    /// Artifact or checkpoint write failed. The checkpoint record stays
    /// in_progress so the item is retried on the next run.
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
