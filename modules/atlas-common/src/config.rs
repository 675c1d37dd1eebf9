use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres (analytical store)
    pub database_url: String,

    // Generative model
    pub anthropic_api_key: String,
    pub model: String,

    // Fallback scraping (remote rendering service). Empty URL disables it.
    pub render_api_url: String,
    pub render_api_token: Option<String>,

    // Durable state
    pub data_dir: String,

    // Run shape
    pub budget_ceiling_cents: u64,
    pub concurrency: usize,
    pub item_estimate_cents: u64,
    pub required_sections: Vec<String>,
    pub min_words: u32,
    pub max_words: u32,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            model: env::var("ATLAS_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
            render_api_url: env::var("RENDER_API_URL").unwrap_or_default(),
            render_api_token: env::var("RENDER_API_TOKEN").ok(),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            budget_ceiling_cents: parsed_env("ATLAS_BUDGET_CENTS", 0),
            concurrency: parsed_env("ATLAS_CONCURRENCY", 4),
            item_estimate_cents: parsed_env("ATLAS_ITEM_ESTIMATE_CENTS", 40),
            required_sections: env::var("ATLAS_REQUIRED_SECTIONS")
                .unwrap_or_else(|_| "overview,trend-narrative,policy-summary".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            min_words: parsed_env("ATLAS_MIN_WORDS", 600),
            max_words: parsed_env("ATLAS_MAX_WORDS", 2500),
        }
    }

    /// Log the effective configuration with secrets redacted.
    pub fn log_redacted(&self) {
        info!(
            model = %self.model,
            render_api = if self.render_api_url.is_empty() { "disabled" } else { "enabled" },
            data_dir = %self.data_dir,
            budget_ceiling_cents = self.budget_ceiling_cents,
            concurrency = self.concurrency,
            item_estimate_cents = self.item_estimate_cents,
            required_sections = ?self.required_sections,
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a number: {e:?}")),
        Err(_) => default,
    }
}
