use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::caption::CaptionUnit;
use crate::diagnostics::{DiagnosticsSink, Stage};
use crate::errors::DubError;
use crate::providers::SpeechSynthesizer;
use crate::timing::SynthesizedClip;

// @module: Speech synthesis stage

/// Speaks every unit into its own WAV file on a bounded worker pool
pub struct SynthesisStage {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    // @field: Folder receiving speech_<index>.wav
    output_dir: PathBuf,
    concurrent_requests: usize,
    progress: Option<ProgressBar>,
}

impl SynthesisStage {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, output_dir: impl Into<PathBuf>, concurrent_requests: usize) -> Self {
        Self {
            synthesizer,
            output_dir: output_dir.into(),
            concurrent_requests: concurrent_requests.max(1),
            progress: None,
        }
    }

    /// Advance this bar once per finished unit
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Render file for a unit
    pub fn clip_path(output_dir: &Path, index: usize) -> PathBuf {
        output_dir.join(format!("speech_{}.wav", index))
    }

    /// Synthesize all units, returning clips in timeline order.
    ///
    /// Failed and empty renders are dropped and reported; the stage only
    /// fails when nothing at all could be rendered.
    pub async fn synthesize(
        &self,
        units: &[CaptionUnit],
        sink: &dyn DiagnosticsSink,
    ) -> Result<Vec<SynthesizedClip>, DubError> {
        if units.is_empty() {
            return Err(DubError::EmptyStage(Stage::Synthesize.to_string()));
        }

        info!("Synthesizing {} units with {}", units.len(), self.synthesizer.name());
        if let Some(progress) = &self.progress {
            progress.set_length(units.len() as u64);
        }

        let results = stream::iter(units.iter())
            .map(|unit| async move {
                let path = Self::clip_path(&self.output_dir, unit.index);
                let result = self.synthesizer.synthesize(&unit.text, &path).await;
                if let Some(progress) = &self.progress {
                    progress.inc(1);
                }
                (unit, result)
            })
            .buffer_unordered(self.concurrent_requests)
            .collect::<Vec<_>>()
            .await;

        let mut clips = Vec::with_capacity(results.len());
        for (unit, result) in results {
            match result {
                Ok(render) if render.duration > 0.0 => {
                    clips.push(SynthesizedClip::new(unit.clone(), render.duration, render.audio));
                }
                Ok(render) => sink.report(Stage::Synthesize, DubError::SynthesisFailure {
                    index: unit.index,
                    message: format!("render has no audio ({:.3}s)", render.duration),
                }),
                Err(e) => sink.report(Stage::Synthesize, DubError::SynthesisFailure {
                    index: unit.index,
                    message: e.to_string(),
                }),
            }
        }

        if clips.is_empty() {
            return Err(DubError::EmptyStage(Stage::Synthesize.to_string()));
        }

        clips.sort_by(|a, b| {
            a.unit.start
                .total_cmp(&b.unit.start)
                .then(a.unit.index.cmp(&b.unit.index))
        });
        debug!("{} of {} units synthesized", clips.len(), units.len());
        Ok(clips)
    }
}
