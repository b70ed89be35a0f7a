use anyhow::{Result, Context};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::app_config::TranslationConfig;
use crate::errors::ProviderError;

use super::{build_batch_prompt, parse_marked_entries, render_system_prompt, Translator};

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// Model used for every request
    model: String,
    /// HTTP client for making requests
    client: Client,
    /// Maximum number of retry attempts
    max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    backoff_base_ms: u64,
    /// Sampling temperature
    temperature: f32,
    /// Prompt template with language placeholders
    system_prompt: String,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: None,
            stream: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options = Some(GenerationOptions { temperature: Some(temperature) });
        self
    }
}

/// Chat response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Model name
    pub model: String,
    /// Response message
    pub message: ChatMessage,
    /// Whether the generation is complete
    pub done: bool,
}

impl Ollama {
    /// Create a client from a complete base URL
    pub fn new(base_url: &str, model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .with_context(|| format!("Invalid Ollama endpoint: {}", base_url))?;

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            model: model.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs.max(1)))
                // Ollama speaks HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .context("Failed to build HTTP client")?,
            max_retries: 3,
            backoff_base_ms: 1000,
            temperature: 0.3,
            system_prompt: String::new(),
        })
    }

    /// Create a client for the active provider of a translation config
    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        let mut client = Self::new(&config.get_endpoint(), config.get_model(), config.get_timeout_secs())?;
        client.max_retries = config.common.retry_count;
        client.backoff_base_ms = config.common.retry_backoff_ms;
        client.temperature = config.common.temperature;
        client.system_prompt = config.common.system_prompt.clone();
        Ok(client)
    }

    /// Chat with the Ollama API, retrying server and network errors
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut attempt = 0;

        loop {
            match self.send_chat(&url, request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff_ms = self.backoff_base_ms * (1u64 << (attempt - 1));
                    let jitter_ms = rand::random_range(0..=backoff_ms / 4);
                    error!(
                        "Ollama API error: {} - attempt {}/{}",
                        e,
                        attempt,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_chat(&self, url: &str, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self.client.post(url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            return Err(ProviderError::ApiError { status_code: status.as_u16(), message });
        }

        let response_text = response.text().await?;
        parse_chat_response(&response_text)
    }

    /// Get the Ollama API version
    pub async fn version(&self) -> Result<String, ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response: serde_json::Value = self.client.get(&url).send().await?.json().await?;

        response["version"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ParseError("Invalid version format in response".to_string()))
    }
}

/// Parse a chat response, accepting both a single object and streamed JSON lines
pub fn parse_chat_response(response_text: &str) -> Result<ChatResponse, ProviderError> {
    if let Ok(response) = serde_json::from_str::<ChatResponse>(response_text) {
        return Ok(response);
    }

    // Streamed output: one JSON object per line, content split across them
    let mut model = String::new();
    let mut content = String::new();
    let mut seen = false;

    for line in response_text.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        seen = true;
        if let Some(name) = value.get("model").and_then(|v| v.as_str()) {
            model = name.to_string();
        }
        if let Some(part) = value.get("message").and_then(|m| m.get("content")).and_then(|v| v.as_str()) {
            content.push_str(part);
        }
    }

    if !seen {
        let preview: String = response_text.chars().take(500).collect();
        return Err(ProviderError::ParseError(format!(
            "Response contains invalid JSON: {}",
            preview
        )));
    }

    Ok(ChatResponse {
        model,
        message: ChatMessage {
            role: "assistant".to_string(),
            content,
        },
        done: true,
    })
}

#[async_trait]
impl Translator for Ollama {
    async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let system = render_system_prompt(&self.system_prompt, source_language, target_language);
        let request = ChatRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(build_batch_prompt(texts))],
        )
        .temperature(self.temperature);

        let response = self.chat(&request).await?;
        debug!("Ollama returned {} chars for {} entries", response.message.content.len(), texts.len());
        parse_marked_entries(&response.message.content, texts.len())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let version = self.version().await?;
        debug!("Connected to Ollama {}", version);
        Ok(())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
