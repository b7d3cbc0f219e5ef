// src/llm/client.rs

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::CONFIG;

/// Thin chat-completions client. Timeouts are enforced both here (socket
/// level) and at the call sites (task level), so a wedged collaborator can
/// never stall a scheduler tick.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl LlmClient {
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("KINDRED_LLM_API_KEY")
            .context("KINDRED_LLM_API_KEY not set")?;

        let client = Client::builder()
            .timeout(CONFIG.llm_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            api_base: CONFIG.llm_base_url.clone(),
            model: CONFIG.llm_model.clone(),
        })
    }

    /// One-shot completion: system + user prompt in, assistant text out.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": CONFIG.llm_max_output_tokens,
            "temperature": 0.8,
        });

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.api_base.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("Failed to send completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("LLM API error {}: {}", status, error_text));
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Completion response missing content"))?;

        Ok(content.trim().to_string())
    }
}
