//! Poem generation through the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use confetti_core::{GenerationError, PoemGenerator};

/// Default Anthropic API root.
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com";

/// Default model for birthday poems.
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

const ANTHROPIC_VERSION: &str = "2023-06-01";

const MAX_TOKENS: u32 = 400;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

fn poem_prompt(descriptions: &[String]) -> String {
    let traits = descriptions
        .iter()
        .map(|d| format!("- {}", d))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Write a short, warm and light-hearted birthday poem of four to eight lines \
         for a colleague. Their coworkers describe them like this:\n{}\n\n\
         Reply with the poem only, without a title.",
        traits
    )
}

/// Writes poems with a Claude model.
pub struct AnthropicPoet {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicPoet {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PoemGenerator for AnthropicPoet {
    async fn generate_poem(&self, descriptions: &[String]) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": poem_prompt(descriptions) }],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Failed(format!("{}: {}", status, text)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Failed(e.to_string()))?;

        let poem = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");
        let poem = poem.trim();
        if poem.is_empty() {
            return Err(GenerationError::Failed("empty completion".to_string()));
        }

        debug!(model = %self.model, lines = poem.lines().count(), "poem generated");
        Ok(poem.to_string())
    }
}

/// Used when no API key is configured; the publisher falls back to its
/// fixed poem.
pub struct DisabledPoet;

#[async_trait]
impl PoemGenerator for DisabledPoet {
    async fn generate_poem(&self, _descriptions: &[String]) -> Result<String, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}
