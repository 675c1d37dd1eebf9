use anyhow::Result;
use async_trait::async_trait;

/// A single generation request: system preamble plus one user turn.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// One completed generation with the provider-reported usage and the cost
/// attributed to this call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_cents: u64,
}

/// Seam for the generative model so pipelines can run against a scripted
/// fake in tests.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion>;
}
