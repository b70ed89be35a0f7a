/*!
 * Provider implementations for translation and speech synthesis.
 *
 * - Ollama: local LLM server (translation)
 * - OpenAI: chat completions (translation) and text-to-speech; also used for
 *   OpenAI-compatible local servers such as LM Studio
 * - Mock: deterministic stand-ins used by tests and the offline preview mode
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::app_config::{SpeechConfig, SpeechProvider, TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;
use crate::timing::AudioHandle;

pub mod mock;
pub mod ollama;
pub mod openai;

/// Marker opening entry `n` of a batch request or response
pub fn entry_marker(n: usize) -> String {
    format!("<<ENTRY_{}>>", n)
}

/// Marker closing a batch
pub const END_MARKER: &str = "<<END>>";

/// Backend able to translate an ordered batch of lines
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Translate `texts`, returning exactly one line per input, in order
    async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError>;

    /// Check that the backend is reachable
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Speech rendered for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRender {
    pub audio: AudioHandle,
    /// Measured length in seconds
    pub duration: f64,
}

/// Backend able to speak one line of text into a WAV file
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + Debug {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<SpeechRender, ProviderError>;

    fn name(&self) -> &str;
}

/// Build the translator selected in the configuration
pub fn build_translator(config: &TranslationConfig) -> Result<Arc<dyn Translator>> {
    let translator: Arc<dyn Translator> = match config.provider {
        TranslationProvider::Ollama => Arc::new(ollama::Ollama::from_config(config)?),
        TranslationProvider::OpenAI | TranslationProvider::LMStudio => {
            Arc::new(openai::OpenAITranslator::from_config(config)?)
        }
    };
    Ok(translator)
}

/// Build the speech synthesizer selected in the configuration
pub fn build_synthesizer(config: &SpeechConfig) -> Result<Arc<dyn SpeechSynthesizer>> {
    let synthesizer: Arc<dyn SpeechSynthesizer> = match config.provider {
        SpeechProvider::OpenAI => Arc::new(openai::OpenAISpeech::from_config(config)?),
        SpeechProvider::Preview => Arc::new(mock::MockSynthesizer::working().with_sample_rate(config.sample_rate)),
    };
    Ok(synthesizer)
}

/// Build the marker-delimited user prompt for a batch
pub fn build_batch_prompt(texts: &[String]) -> String {
    let mut prompt = String::from(
        "Translate each entry below. Keep every marker exactly as written and answer with the same markers, one translation per entry, followed by <<END>>.\n\n",
    );
    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&entry_marker(i));
        prompt.push('\n');
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt.push_str(END_MARKER);
    prompt
}

/// Split a marker-delimited response into `expected` translations
pub fn parse_marked_entries(response: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let body = response.split(END_MARKER).next().unwrap_or(response);
    let mut entries = Vec::with_capacity(expected);

    for i in 0..expected {
        let marker = entry_marker(i);
        let start = body
            .find(&marker)
            .map(|pos| pos + marker.len())
            .ok_or_else(|| ProviderError::ParseError(format!("missing {} in response", marker)))?;

        let rest = &body[start..];
        let end = rest.find("<<ENTRY_").unwrap_or(rest.len());
        let text = rest[..end].split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(ProviderError::ParseError(format!("empty translation for {}", marker)));
        }
        entries.push(text);
    }

    Ok(entries)
}

/// Fill `{source_language}` and `{target_language}` in a prompt template
pub fn render_system_prompt(template: &str, source_language: &str, target_language: &str) -> String {
    let source = crate::language_utils::get_language_name(source_language)
        .unwrap_or_else(|_| source_language.to_string());
    let target = crate::language_utils::get_language_name(target_language)
        .unwrap_or_else(|_| target_language.to_string());

    template
        .replace("{source_language}", &source)
        .replace("{target_language}", &target)
}
