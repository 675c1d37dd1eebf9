//! Pulls structured planning-application metrics for one authority out of
//! the analytical store. Zero records is a valid low-signal result; only an
//! unreachable store is an error.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::info;

use atlas_common::{AtlasError, SiteComplexity, WorkItem};

use crate::assembler::PageArtifact;

/// Months of trend series fetched per item: current 12 plus the prior 12
/// for the year-over-year comparison.
const TREND_MONTHS: u32 = 24;
const TOP_CATEGORY_LIMIT: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthCount {
    /// "YYYY-MM"
    pub month: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Structured facts for one authority, produced fresh per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedMetrics {
    pub total_applications: u64,
    pub applications_last_year: u64,
    /// Percent of decided applications that were granted. 0 when nothing
    /// has been decided.
    pub approval_rate_pct: f64,
    /// Year-over-year change in application volume, percent. 0 when the
    /// prior year had no applications.
    pub yoy_change_pct: f64,
    /// Oldest-first monthly counts, up to 24 months.
    pub monthly_trend: Vec<MonthCount>,
    pub top_categories: Vec<CategoryCount>,
}

/// Read-only seam over the analytical store.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Active authority roster, the run's work-item set.
    async fn roster(&self) -> Result<Vec<WorkItem>>;

    async fn total_applications(&self, item_id: &str) -> Result<u64>;

    /// (granted, decided) counts over all time.
    async fn decision_counts(&self, item_id: &str) -> Result<(u64, u64)>;

    /// Oldest-first monthly application counts for the trailing window.
    async fn monthly_counts(&self, item_id: &str, months: u32) -> Result<Vec<MonthCount>>;

    async fn top_categories(&self, item_id: &str, limit: i64) -> Result<Vec<CategoryCount>>;

    /// Optional mirror of a finished artifact into the store for
    /// query-time serving. Default: not mirrored.
    async fn mirror_artifact(&self, _artifact: &PageArtifact) -> Result<()> {
        Ok(())
    }
}

pub struct DataExtractor {
    store: Arc<dyn MetricsStore>,
}

impl DataExtractor {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    pub async fn extract(&self, item: &WorkItem) -> Result<ExtractedMetrics, AtlasError> {
        let total = self
            .store
            .total_applications(&item.id)
            .await
            .map_err(|e| AtlasError::DataUnavailable(e.to_string()))?;
        let (granted, decided) = self
            .store
            .decision_counts(&item.id)
            .await
            .map_err(|e| AtlasError::DataUnavailable(e.to_string()))?;
        let trend = self
            .store
            .monthly_counts(&item.id, TREND_MONTHS)
            .await
            .map_err(|e| AtlasError::DataUnavailable(e.to_string()))?;
        let categories = self
            .store
            .top_categories(&item.id, TOP_CATEGORY_LIMIT)
            .await
            .map_err(|e| AtlasError::DataUnavailable(e.to_string()))?;

        let split = trend.len().saturating_sub(12);
        let last_year: u64 = trend[split..].iter().map(|m| m.count).sum();
        let prior_year: u64 = trend[..split].iter().map(|m| m.count).sum();

        let approval_rate_pct = if decided > 0 {
            granted as f64 / decided as f64 * 100.0
        } else {
            0.0
        };
        let yoy_change_pct = if prior_year > 0 {
            (last_year as f64 - prior_year as f64) / prior_year as f64 * 100.0
        } else {
            0.0
        };

        info!(
            item = %item.id,
            total,
            last_year,
            approval_rate_pct,
            "Metrics extracted"
        );

        Ok(ExtractedMetrics {
            total_applications: total,
            applications_last_year: last_year,
            approval_rate_pct,
            yoy_change_pct,
            monthly_trend: trend,
            top_categories: categories,
        })
    }
}

// --- Postgres implementation ---

pub struct PgMetricsStore {
    pool: PgPool,
}

impl PgMetricsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsStore for PgMetricsStore {
    async fn roster(&self) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query(
            "SELECT id, name, tags, estimated_records, complex_site, website \
             FROM authorities WHERE active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(WorkItem {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    tags: row.try_get("tags")?,
                    estimated_records: row.try_get::<i64, _>("estimated_records")? as u64,
                    complexity: if row.try_get("complex_site")? {
                        SiteComplexity::Complex
                    } else {
                        SiteComplexity::Simple
                    },
                    website: row.try_get("website")?,
                })
            })
            .collect()
    }

    async fn total_applications(&self, item_id: &str) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM planning_applications WHERE authority_id = $1",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    async fn decision_counts(&self, item_id: &str) -> Result<(u64, u64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) FILTER (WHERE decision = 'granted') AS granted, \
                    COUNT(*) FILTER (WHERE decision IS NOT NULL) AS decided \
             FROM planning_applications WHERE authority_id = $1",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((
            row.try_get::<i64, _>("granted")? as u64,
            row.try_get::<i64, _>("decided")? as u64,
        ))
    }

    async fn monthly_counts(&self, item_id: &str, months: u32) -> Result<Vec<MonthCount>> {
        let rows = sqlx::query(
            "SELECT to_char(date_trunc('month', received_at), 'YYYY-MM') AS month, \
                    COUNT(*) AS n \
             FROM planning_applications \
             WHERE authority_id = $1 \
               AND received_at >= date_trunc('month', now()) - make_interval(months => $2) \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(item_id)
        .bind(months as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(MonthCount {
                    month: row.try_get("month")?,
                    count: row.try_get::<i64, _>("n")? as u64,
                })
            })
            .collect()
    }

    async fn top_categories(&self, item_id: &str, limit: i64) -> Result<Vec<CategoryCount>> {
        let rows = sqlx::query(
            "SELECT category, COUNT(*) AS n \
             FROM planning_applications \
             WHERE authority_id = $1 AND category IS NOT NULL \
             GROUP BY category ORDER BY n DESC, category LIMIT $2",
        )
        .bind(item_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CategoryCount {
                    category: row.try_get("category")?,
                    count: row.try_get::<i64, _>("n")? as u64,
                })
            })
            .collect()
    }

    async fn mirror_artifact(&self, artifact: &PageArtifact) -> Result<()> {
        sqlx::query(
            "INSERT INTO generated_pages (authority_id, artifact, generated_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (authority_id) \
             DO UPDATE SET artifact = EXCLUDED.artifact, generated_at = EXCLUDED.generated_at",
        )
        .bind(&artifact.item_id)
        .bind(serde_json::to_value(artifact)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{work_item, FakeMetricsStore};

    #[tokio::test]
    async fn zero_record_authority_yields_zero_metrics_not_an_error() {
        let store = Arc::new(FakeMetricsStore::empty());
        let extractor = DataExtractor::new(store);
        let metrics = extractor.extract(&work_item("ghost", &[])).await.unwrap();
        assert_eq!(metrics.total_applications, 0);
        assert_eq!(metrics.applications_last_year, 0);
        assert_eq!(metrics.approval_rate_pct, 0.0);
        assert_eq!(metrics.yoy_change_pct, 0.0);
        assert!(metrics.monthly_trend.is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_is_data_unavailable() {
        let store = Arc::new(FakeMetricsStore::unreachable());
        let extractor = DataExtractor::new(store);
        let err = extractor
            .extract(&work_item("bristol", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn yoy_and_approval_rates_are_derived_from_counts() {
        let mut store = FakeMetricsStore::empty();
        store.totals.insert("bristol".into(), 300);
        store.decisions.insert("bristol".into(), (80, 100));
        // 24 months: first 12 at 10/month, last 12 at 15/month
        let mut trend = Vec::new();
        for (i, count) in std::iter::repeat(10u64)
            .take(12)
            .chain(std::iter::repeat(15u64).take(12))
            .enumerate()
        {
            trend.push(MonthCount {
                month: format!("2024-{:02}", i % 12 + 1),
                count,
            });
        }
        store.monthly.insert("bristol".into(), trend);

        let extractor = DataExtractor::new(Arc::new(store));
        let metrics = extractor
            .extract(&work_item("bristol", &[]))
            .await
            .unwrap();
        assert_eq!(metrics.applications_last_year, 180);
        assert_eq!(metrics.approval_rate_pct, 80.0);
        assert_eq!(metrics.yoy_change_pct, 50.0);
    }
}
