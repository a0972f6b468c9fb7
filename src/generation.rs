//! Chat-completion client for the revision and explanation calls.
//!
//! Talks to any OpenAI-compatible chat-completions endpoint (the default is
//! the OpenAI API; a local LM Studio or Ollama server works by overriding
//! `[generation].base_url`). One request per call, single candidate,
//! temperature from config (0 by default for deterministic output), no
//! retries; a failure surfaces directly as a `GenerationService` error.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{AssistError, AssistResult};

pub struct GenerationClient {
    client: reqwest::Client,
    config: GenerationConfig,
    api_key: Option<String>,
}

impl GenerationClient {
    /// Build a client from config. The API key is read from
    /// `OPENAI_API_KEY` and is optional (local servers don't need one).
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        resolve_endpoint(&self.config.base_url)
    }

    /// Send a single-turn prompt and return the trimmed text of the top
    /// candidate.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> AssistResult<String> {
        let body = request_body(&self.config.model, prompt, max_tokens, self.config.temperature);

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AssistError::GenerationService(anyhow!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(AssistError::GenerationService(anyhow!(
                "chat completion API error {}: {}",
                status,
                body_text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AssistError::GenerationService(anyhow!("invalid response: {}", e)))?;

        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| {
                AssistError::GenerationService(anyhow!("response has no candidate text"))
            })?;

        Ok(content.trim().to_string())
    }
}

fn resolve_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

fn request_body(model: &str, prompt: &str, max_tokens: u32, temperature: f32) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "max_tokens": max_tokens,
        "temperature": temperature,
        "n": 1,
    })
}
