//! Generation service abstraction and implementations.
//!
//! The knowledge base treats text generation as an opaque, stateless
//! `prompt → text` call. Its responsibility ends at prompt assembly and
//! resumes when the response is handed back verbatim.
//!
//! Implementations:
//! - **[`DisabledGenerator`]**: always fails.
//! - **[`OpenAIGenerator`]**: `POST /v1/chat/completions` on any OpenAI-compatible server.
//! - **[`OllamaGenerator`]**: `POST /api/generate` with streaming off.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::GenerationConfig;
use crate::error::{KbError, Result};
use crate::http;

/// Prompt → completion text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier used for completions.
    fn model_name(&self) -> &str;

    /// Send `prompt` and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// A generator that always fails. Used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(KbError::GenerationService(
            "generation provider is disabled".to_string(),
        ))
    }
}

/// Chat-completions client for OpenAI and compatible servers.
///
/// The prompt is sent as a single user message. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| KbError::Config("generation.model required for OpenAI".to_string()))?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            KbError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let client = http::build_client(config.timeout_secs).map_err(KbError::Config)?;

        Ok(Self {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = http::post_json(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(KbError::GenerationService)?;

        parse_chat_response(&response)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            KbError::GenerationService(
                "invalid chat response: missing choices[0].message.content".to_string(),
            )
        })
}

/// Completion client for a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| KbError::Config("generation.model required for Ollama".to_string()))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = http::build_client(config.timeout_secs).map_err(KbError::Config)?;

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let url = format!("{}/api/generate", self.url);
        let response = http::post_json(&self.client, &url, None, &body, self.max_retries, "Ollama")
            .await
            .map_err(KbError::GenerationService)?;

        response
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                KbError::GenerationService("invalid Ollama response: missing response".to_string())
            })
    }
}

/// Create the appropriate [`Generator`] based on configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => Err(KbError::Config(format!(
            "Unknown generation provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response_passes_content_through() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "| TC-001 | ... |\n" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "| TC-001 | ... |\n");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let err = parse_chat_response(&serde_json::json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, KbError::GenerationService(_)));
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let err = DisabledGenerator.complete("prompt").await.unwrap_err();
        assert!(matches!(err, KbError::GenerationService(_)));
    }

    #[test]
    fn test_ollama_requires_model() {
        let config = GenerationConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_generator(&config).err(),
            Some(KbError::Config(_))
        ));
    }
}
