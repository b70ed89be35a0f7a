/*!
 * Common test utilities for the dubwai test suite
 */

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use dubwai::app_config::TimingConfig;
use dubwai::caption::CaptionUnit;
use dubwai::diagnostics::DiagnosticsSink;
use dubwai::errors::DubError;
use dubwai::media::{self, WavProbe};
use dubwai::pipeline::{ClipRenderer, DubPipeline};
use dubwai::providers::{SpeechSynthesizer, Translator};
use dubwai::synthesis::SynthesisStage;
use dubwai::timing::{AudioHandle, SynthesizedClip, TimedPlacement};
use dubwai::translation::TranslationStage;

/// Sample rate used by test renders
pub const TEST_SAMPLE_RATE: u32 = 8_000;

/// Route library logs to the test output; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Shorthand for a caption unit
pub fn unit(index: usize, start: f64, end: f64, text: &str) -> CaptionUnit {
    CaptionUnit::new(index, start, end, text)
}

/// Clip for `[start, end)` whose render lasts `duration`
pub fn clip(index: usize, start: f64, end: f64, duration: f64) -> SynthesizedClip {
    SynthesizedClip::new(
        unit(index, start, end, "text"),
        duration,
        AudioHandle::new(format!("tts/speech_{}.wav", index)),
    )
}

/// Sample WebVTT content as produced by auto-generated captions
pub const SAMPLE_VTT: &str = "WEBVTT
Kind: captions
Language: en

NOTE generated for tests

1
00:00:00.000 --> 00:00:02.000 align:start position:0%
Hello there.

2
00:00:02.100 --> 00:00:05.000
how are you <c>today</c>?

3
00:00:07.000 --> 00:00:09.000
Fine, thanks.
";

/// Sample SRT content
pub const SAMPLE_SRT: &str = "1
00:00:01,000 --> 00:00:04,000
This is a test subtitle.

2
00:00:05,000 --> 00:00:09,000
It contains multiple
entries.

3
00:00:10,000 --> 00:00:14,000
For testing purposes.
";

/// Renderer writing a silent WAV of the planned length, standing in for ffmpeg
#[derive(Debug, Default)]
pub struct PlannedSilenceRenderer;

#[async_trait]
impl ClipRenderer for PlannedSilenceRenderer {
    async fn render(&self, placement: &TimedPlacement) -> Result<(), DubError> {
        if !placement.needs_tempo_change() {
            return Ok(());
        }
        media::write_silence_wav(placement.effective_audio.path(), placement.planned_duration(), TEST_SAMPLE_RATE)
            .map(|_| ())
            .map_err(|e| DubError::AssemblyIo {
                index: placement.index,
                message: e.to_string(),
            })
    }
}

/// Renderer that always fails
#[derive(Debug, Default)]
pub struct FailingRenderer;

#[async_trait]
impl ClipRenderer for FailingRenderer {
    async fn render(&self, placement: &TimedPlacement) -> Result<(), DubError> {
        if !placement.needs_tempo_change() {
            return Ok(());
        }
        Err(DubError::AssemblyIo {
            index: placement.index,
            message: "simulated render failure".to_string(),
        })
    }
}

/// Pipeline over the given backends writing renders into `dir`
pub fn test_pipeline(
    dir: &Path,
    translator: Arc<dyn Translator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    renderer: Arc<dyn ClipRenderer>,
    sink: Arc<dyn DiagnosticsSink>,
) -> DubPipeline {
    DubPipeline::new(
        TimingConfig::default(),
        TranslationStage::new(translator, "en", "tt"),
        SynthesisStage::new(synthesizer, dir, 3),
        renderer,
        Arc::new(WavProbe),
        sink,
    )
}
