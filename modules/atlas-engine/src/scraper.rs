//! Supplementary content scraping with a cheap primary strategy and a paid
//! fallback for sites classified complex up front. Scraping never fails the
//! pipeline: both strategies coming up empty just degrades content quality.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{info, warn};

use atlas_common::{SiteComplexity, WorkItem};

use crate::budget::BudgetLedger;
use crate::retry::RetryPolicy;

/// Below this many characters of cleaned text, a fetch is treated as
/// unusable (parked domains, cookie walls, bot screens).
const MIN_USABLE_CHARS: usize = 200;

/// Paragraphs shorter than this are navigation debris, not content.
const MIN_SNIPPET_CHARS: usize = 80;
const MAX_SNIPPETS: usize = 12;

/// Flat charge per remote rendering call. The service bills per page.
const RENDER_FETCH_COST_CENTS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Primary,
    Fallback,
}

/// Unstructured page snippets plus which strategy produced them. May be
/// empty; an empty scrape is a degraded input, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedContent {
    pub snippets: Vec<String>,
    pub strategy: Option<FetchStrategy>,
    pub fetched_at: DateTime<Utc>,
}

impl ScrapedContent {
    pub fn empty() -> Self {
        Self {
            snippets: Vec::new(),
            strategy: None,
            fetched_at: Utc::now(),
        }
    }

    fn from_text(text: &str, strategy: FetchStrategy) -> Self {
        let snippets = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| p.len() >= MIN_SNIPPET_CHARS)
            .take(MAX_SNIPPETS)
            .map(String::from)
            .collect();
        Self {
            snippets,
            strategy: Some(strategy),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

// --- PageFetcher trait ---

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch cleaned main content for a URL. Empty string means the page
    /// yielded nothing usable; transport problems are errors.
    async fn fetch(&self, url: &str) -> Result<String>;
    fn name(&self) -> &str;
    /// Whether each call incurs a billed charge.
    fn metered(&self) -> bool {
        false
    }
}

/// Readability extraction shared by both fetchers.
fn readable(url: &str, html: &str) -> String {
    let parsed_url = url::Url::parse(url).ok();
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

// --- Primary: plain HTTP fetch + Readability ---

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .user_agent("atlas-pages/0.1")
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url).context("Invalid URL")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Only http/https URLs are allowed, got: {}", parsed.scheme());
        }

        info!(url, fetcher = "http", "Fetching URL");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP fetch failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("HTTP fetch returned {}", resp.status());
        }
        let html = resp.text().await.context("Failed to read response body")?;
        let text = readable(url, &html);

        if text.trim().is_empty() {
            warn!(url, fetcher = "http", "Empty content after Readability extraction");
            return Ok(String::new());
        }
        info!(url, fetcher = "http", bytes = text.len(), "Fetched successfully");
        Ok(text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// --- Fallback: paid remote rendering service + Readability ---

pub struct RenderApiFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RenderApiFetcher {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        info!(base_url, "Using remote rendering fetcher");
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(45))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }
}

#[async_trait]
impl PageFetcher for RenderApiFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        info!(url, fetcher = "render-api", "Fetching rendered URL");
        let resp = self
            .client
            .post(&endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .context("Render API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            anyhow::bail!("Render API error ({status}): {message}");
        }
        let html = resp.text().await.context("Failed to read rendered body")?;
        let text = readable(url, &html);

        if text.trim().is_empty() {
            warn!(url, fetcher = "render-api", "Empty content after Readability extraction");
            return Ok(String::new());
        }
        info!(url, fetcher = "render-api", bytes = text.len(), "Fetched successfully");
        Ok(text)
    }

    fn name(&self) -> &str {
        "render-api"
    }

    fn metered(&self) -> bool {
        true
    }
}

/// No-op fetcher for when no rendering service is configured.
pub struct NoopFetcher;

#[async_trait]
impl PageFetcher for NoopFetcher {
    async fn fetch(&self, _url: &str) -> Result<String> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

// --- ContentScraper ---

pub struct ContentScraper {
    primary: Arc<dyn PageFetcher>,
    fallback: Arc<dyn PageFetcher>,
    ledger: Arc<BudgetLedger>,
    retry: RetryPolicy,
}

impl ContentScraper {
    pub fn new(
        primary: Arc<dyn PageFetcher>,
        fallback: Arc<dyn PageFetcher>,
        ledger: Arc<BudgetLedger>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            ledger,
            retry,
        }
    }

    /// Scrape supplementary content for one authority. Primary strategy
    /// first; the paid fallback is tried exactly once, and only for items
    /// classified complex up front. Never errors.
    pub async fn scrape(&self, item: &WorkItem) -> ScrapedContent {
        let Some(url) = item.website.as_deref() else {
            return ScrapedContent::empty();
        };

        match self
            .retry
            .run(self.primary.name(), |_| self.primary.fetch(url))
            .await
        {
            Ok((text, _)) if text.trim().len() >= MIN_USABLE_CHARS => {
                return ScrapedContent::from_text(&text, FetchStrategy::Primary);
            }
            Ok(_) => {
                info!(item = %item.id, url, "Primary fetch yielded nothing usable");
            }
            Err(e) => {
                warn!(item = %item.id, url, error = %e, "Primary fetch failed");
            }
        }

        if item.complexity != SiteComplexity::Complex {
            return ScrapedContent::empty();
        }

        // Paid call: charge before the outcome is known. Unmetered
        // stand-ins (no rendering service configured) cost nothing.
        if self.fallback.metered() {
            self.ledger.charge(RENDER_FETCH_COST_CENTS);
        }
        match self.fallback.fetch(url).await {
            Ok(text) if text.trim().len() >= MIN_USABLE_CHARS => {
                ScrapedContent::from_text(&text, FetchStrategy::Fallback)
            }
            Ok(_) => {
                info!(item = %item.id, url, "Fallback fetch yielded nothing usable");
                ScrapedContent::empty()
            }
            Err(e) => {
                warn!(item = %item.id, url, error = %e, "Fallback fetch failed");
                ScrapedContent::empty()
            }
        }
    }
}
