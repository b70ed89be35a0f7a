/*!
 * Mock provider implementations.
 *
 * `MockTranslator` and `MockSynthesizer` simulate the remote backends:
 * - `working()` - always succeeds
 * - `intermittent(n)` - every nth request fails
 * - `failing()` - always fails
 *
 * `MockSynthesizer` writes real (silent) WAV files, so everything downstream
 * of synthesis runs unchanged. The offline preview speech mode uses it too.
 */

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::media;
use crate::timing::AudioHandle;

use super::{SpeechRender, SpeechSynthesizer, Translator};

/// Behavior mode for the mock providers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails every Nth request
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Translator returns one line too few; synthesizer renders zero samples
    Truncated,
    /// Succeeds after a delay
    Slow { delay_ms: u64 },
}

impl MockBehavior {
    async fn gate(&self, count: usize) -> Result<(), ProviderError> {
        match *self {
            Self::Intermittent { fail_every } if fail_every > 0 && count % fail_every == fail_every - 1 => {
                Err(ProviderError::ApiError {
                    status_code: 503,
                    message: format!("Simulated intermittent failure (request #{})", count + 1),
                })
            }
            Self::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated provider failure".to_string(),
            }),
            Self::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Mock translator prefixing each line with the target language
#[derive(Debug, Clone)]
pub struct MockTranslator {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
}

impl MockTranslator {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Requests seen so far, shared between clones
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        _source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.behavior.gate(count).await?;

        let mut translated: Vec<String> = texts
            .iter()
            .map(|text| format!("[{}] {}", target_language, text))
            .collect();
        if self.behavior == MockBehavior::Truncated {
            translated.pop();
        }
        Ok(translated)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated outage".to_string())),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock synthesizer writing silent WAV files sized to the text
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
    sample_rate: u32,
    duration_fn: fn(&str) -> f64,
}

/// Roughly 15 characters per second, never shorter than 0.3s
pub fn estimated_speech_duration(text: &str) -> f64 {
    (text.chars().count() as f64 / 15.0).max(0.3)
}

impl MockSynthesizer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            sample_rate: 16_000,
            duration_fn: estimated_speech_duration,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Override how long the render of a given text lasts
    pub fn with_duration_fn(mut self, duration_fn: fn(&str) -> f64) -> Self {
        self.duration_fn = duration_fn;
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<SpeechRender, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.behavior.gate(count).await?;

        let duration = if self.behavior == MockBehavior::Truncated {
            0.0
        } else {
            (self.duration_fn)(text)
        };

        let written = media::write_silence_wav(output_path, duration, self.sample_rate)
            .map_err(|e| ProviderError::Io(e.to_string()))?;

        Ok(SpeechRender {
            audio: AudioHandle::new(output_path),
            duration: written,
        })
    }

    fn name(&self) -> &str {
        "mock-speech"
    }
}
