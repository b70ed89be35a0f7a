use anyhow::{Result, Context};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::app_config::{SpeechConfig, TranslationConfig};
use crate::errors::ProviderError;
use crate::media;
use crate::timing::AudioHandle;

use super::{build_batch_prompt, parse_marked_entries, render_system_prompt, SpeechRender, SpeechSynthesizer, Translator};

/// Sample rate of the raw `pcm` speech format
pub const OPENAI_PCM_SAMPLE_RATE: u32 = 24_000;

/// Chat message in the OpenAI format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// One completion choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
}

/// Speech request body
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let parsed = Url::parse(endpoint)
        .with_context(|| format!("Invalid OpenAI endpoint: {}", endpoint))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .context("Failed to build HTTP client")
}

async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let message = response.text().await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());

    match status.as_u16() {
        401 | 403 => ProviderError::AuthenticationError(message),
        code => ProviderError::ApiError { status_code: code, message },
    }
}

/// Translator backed by an OpenAI-compatible chat completions endpoint
#[derive(Debug)]
pub struct OpenAITranslator {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    system_prompt: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl OpenAITranslator {
    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.get_timeout_secs())?,
            api_key: config.get_api_key(),
            endpoint: normalize_endpoint(&config.get_endpoint())?,
            model: config.get_model(),
            temperature: config.common.temperature,
            system_prompt: config.common.system_prompt.clone(),
            max_retries: config.common.retry_count,
            backoff_base_ms: config.common.retry_backoff_ms,
        })
    }

    /// Send a chat completion and return the first choice's text
    pub async fn complete(&self, request: &OpenAIRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let mut attempt = 0;

        loop {
            let mut builder = self.client.post(&url).json(request);
            if !self.api_key.is_empty() {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.api_key));
            }

            let result = match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed: OpenAIResponse = response.json().await?;
                    parsed
                        .choices
                        .into_iter()
                        .next()
                        .map(|choice| choice.message.content)
                        .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))
                }
                Ok(response) => Err(error_from_response(response).await),
                Err(e) => Err(e.into()),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff_ms = self.backoff_base_ms * (1u64 << (attempt - 1));
                    warn!("OpenAI request failed: {} - retrying in {}ms", e, backoff_ms);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl Translator for OpenAITranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: render_system_prompt(&self.system_prompt, source_language, target_language),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: build_batch_prompt(texts),
                },
            ],
            temperature: Some(self.temperature),
        };

        let content = self.complete(&request).await?;
        parse_marked_entries(&content, texts.len())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/models", self.endpoint);
        let mut builder = self.client.get(&url);
        if !self.api_key.is_empty() {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.api_key));
        }

        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Text-to-speech through the OpenAI `/audio/speech` endpoint
#[derive(Debug)]
pub struct OpenAISpeech {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    voice: String,
}

impl OpenAISpeech {
    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: config.api_key.clone(),
            endpoint: normalize_endpoint(&config.endpoint)?,
            model: config.model.clone(),
            voice: config.voice.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeech {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<SpeechRender, ProviderError> {
        let url = format!("{}/audio/speech", self.endpoint);
        // Raw PCM avoids streamed WAV headers with a bogus data length
        let body = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: "pcm",
        };

        let response = self.client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response.bytes().await?;
        if bytes.len() < 2 {
            return Err(ProviderError::ParseError("speech response is empty".to_string()));
        }

        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let duration = samples.len() as f64 / OPENAI_PCM_SAMPLE_RATE as f64;

        let path = output_path.to_path_buf();
        tokio::task::spawn_blocking(move || media::write_pcm_wav(&path, &samples, OPENAI_PCM_SAMPLE_RATE))
            .await
            .map_err(|e| ProviderError::Io(e.to_string()))?
            .map_err(|e| ProviderError::Io(e.to_string()))?;

        debug!("Synthesized {:.3}s of speech into {:?}", duration, output_path);
        Ok(SpeechRender {
            audio: AudioHandle::new(output_path),
            duration,
        })
    }

    fn name(&self) -> &str {
        "openai-tts"
    }
}
