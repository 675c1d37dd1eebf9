use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{Completion, Prompt, TextModel};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Per-call timeout. Long-form sections can take a while to stream out.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Wire types (Messages API, text path only)
// =============================================================================

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl ChatResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// Cents per million tokens, (input, output). Unknown models get Haiku
/// rates; budget enforcement prefers a real number over a zero.
fn rates_for(model: &str) -> (u64, u64) {
    if model.contains("opus") {
        (1500, 7500)
    } else if model.contains("sonnet") {
        (300, 1500)
    } else {
        (100, 500)
    }
}

/// Attributed cost of one call in whole cents, rounded up. Never zero for
/// a call that consumed any tokens.
pub fn cost_cents(model: &str, input_tokens: u32, output_tokens: u32) -> u64 {
    let (in_rate, out_rate) = rates_for(model);
    let micros =
        input_tokens as u128 * in_rate as u128 + output_tokens as u128 * out_rate as u128;
    if micros == 0 {
        return 0;
    }
    micros.div_ceil(1_000_000) as u64
}

// =============================================================================
// Client
// =============================================================================

pub struct ClaudeModel {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeModel {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl TextModel for ClaudeModel {
    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        let url = format!("{}/messages", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            max_tokens,
            system: &prompt.system,
            messages: vec![WireMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        debug!(model = %self.model, max_tokens, "Claude generate request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Claude API error ({}): {}", status, error_text));
        }

        let parsed: ChatResponse = response.json().await?;
        let cost = cost_cents(&self.model, parsed.usage.input_tokens, parsed.usage.output_tokens);

        Ok(Completion {
            text: parsed.text(),
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            cost_cents: cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_rounds_up_to_whole_cents() {
        // 1000 input + 500 output tokens on Haiku rates: 0.1 + 0.25 cents
        assert_eq!(cost_cents("claude-haiku-4-5-20251001", 1000, 500), 1);
        // Zero-token call costs nothing
        assert_eq!(cost_cents("claude-haiku-4-5-20251001", 0, 0), 0);
    }

    #[test]
    fn sonnet_priced_above_haiku() {
        let haiku = cost_cents("claude-haiku-4-5-20251001", 100_000, 100_000);
        let sonnet = cost_cents("claude-sonnet-4-5", 100_000, 100_000);
        assert!(sonnet > haiku);
    }

    #[test]
    fn response_text_joins_text_blocks_only() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "first"},
                {"type": "thinking", "thinking": "hidden"},
                {"type": "text", "text": "second"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 34}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text(), "first\nsecond");
        assert_eq!(parsed.usage.input_tokens, 12);
    }
}
