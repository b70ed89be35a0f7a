/*!
 * Stage orchestration.
 *
 * `DubPipeline` chains merge → translate → synthesize → plan → render →
 * assemble. Backends are injected as trait objects so the same pipeline runs
 * against real providers, mocks, or a stage record loaded from disk.
 */

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use crate::app_config::TimingConfig;
use crate::caption::CaptionUnit;
use crate::checkpoint::StageRecord;
use crate::diagnostics::{DiagnosticsSink, Stage};
use crate::errors::DubError;
use crate::synthesis::SynthesisStage;
use crate::timing::{ClipPlanner, ClipProbe, SegmentMerger, SynthesizedClip, TimedPlacement, Track, TrackAssembler};
use crate::translation::TranslationStage;

/// Produces the speed-adjusted audio a placement points to
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    /// Write `placement.effective_audio`; a no-op when the speed is unchanged
    async fn render(&self, placement: &TimedPlacement) -> Result<(), DubError>;
}

/// Everything produced on the way to a track.
///
/// Stages skipped because the run resumed from a record are `None`.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub merged: Option<Vec<CaptionUnit>>,
    pub translated: Option<Vec<CaptionUnit>>,
    pub clips: Vec<SynthesizedClip>,
    pub placements: Vec<TimedPlacement>,
    pub track: Track,
}

impl PipelineOutput {
    /// Units as spoken: the translation when available, else the synthesized text
    pub fn spoken_units(&self) -> Vec<CaptionUnit> {
        match &self.translated {
            Some(units) => units.clone(),
            None => self.clips.iter().map(|clip| clip.unit.clone()).collect(),
        }
    }
}

pub struct DubPipeline {
    timing: TimingConfig,
    translation: TranslationStage,
    synthesis: SynthesisStage,
    renderer: Arc<dyn ClipRenderer>,
    probe: Arc<dyn ClipProbe>,
    sink: Arc<dyn DiagnosticsSink>,
    // @field: Clips re-timed at once
    render_concurrency: usize,
    // @field: Where stage records are written as they complete
    checkpoint_dir: Option<PathBuf>,
}

impl DubPipeline {
    pub fn new(
        timing: TimingConfig,
        translation: TranslationStage,
        synthesis: SynthesisStage,
        renderer: Arc<dyn ClipRenderer>,
        probe: Arc<dyn ClipProbe>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            timing,
            translation,
            synthesis,
            renderer,
            probe,
            sink,
            render_concurrency: 4,
            checkpoint_dir: None,
        }
    }

    pub fn with_render_concurrency(mut self, render_concurrency: usize) -> Self {
        self.render_concurrency = render_concurrency.max(1);
        self
    }

    /// Save a stage record into `dir` after each stage
    pub fn with_checkpoints(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticsSink> {
        &self.sink
    }

    /// Group fragments into spoken units, or pass them through when merging is off
    pub fn merge(&self, units: &[CaptionUnit]) -> Vec<CaptionUnit> {
        if !self.timing.merge_segments {
            info!("Segment merging disabled, keeping {} units", units.len());
            return units
                .iter()
                .enumerate()
                .map(|(i, unit)| CaptionUnit { index: i + 1, ..unit.clone() })
                .collect();
        }

        let merged = SegmentMerger::new(&self.timing).merge(units);
        info!("Merged {} caption fragments into {} units", units.len(), merged.len());
        merged
    }

    pub async fn translate(&self, units: &[CaptionUnit]) -> Result<Vec<CaptionUnit>, DubError> {
        self.translation.translate(units, self.sink.as_ref()).await
    }

    pub async fn synthesize(&self, units: &[CaptionUnit]) -> Result<Vec<SynthesizedClip>, DubError> {
        self.synthesis.synthesize(units, self.sink.as_ref()).await
    }

    pub fn plan(&self, clips: &[SynthesizedClip]) -> Vec<TimedPlacement> {
        ClipPlanner::new(&self.timing).plan_all(clips, self.sink.as_ref())
    }

    /// Produce the adjusted audio of every placement.
    ///
    /// A placement whose render fails plays its source audio at normal speed
    /// instead; the assembler then corrects the drift from its real length.
    pub async fn render_clips(&self, placements: Vec<TimedPlacement>) -> Vec<TimedPlacement> {
        let mut rendered = stream::iter(placements.into_iter().enumerate())
            .map(|(position, placement)| async move {
                let result = self.renderer.render(&placement).await;
                (position, placement, result)
            })
            .buffer_unordered(self.render_concurrency)
            .collect::<Vec<_>>()
            .await;

        rendered.sort_by_key(|(position, _, _)| *position);

        rendered
            .into_iter()
            .map(|(_, mut placement, result)| {
                if let Err(e) = result {
                    self.sink.report(Stage::Render, e);
                    placement.speed_factor = 1.0;
                    placement.effective_audio = placement.source_audio.clone();
                }
                placement
            })
            .collect()
    }

    pub fn assemble(&self, placements: &[TimedPlacement]) -> Track {
        TrackAssembler::new(&self.timing).assemble(placements, self.probe.as_ref(), self.sink.as_ref())
    }

    /// Run every stage on freshly parsed caption units
    pub async fn build_track(&self, units: &[CaptionUnit]) -> Result<PipelineOutput, DubError> {
        self.run_from(StageRecord::Captions(units.to_vec())).await
    }

    /// Continue from a stage record, running only the stages after it
    pub async fn run_from(&self, record: StageRecord) -> Result<PipelineOutput, DubError> {
        let mut output = PipelineOutput::default();

        let clips = match record {
            StageRecord::Captions(units) => {
                let merged = self.require(Stage::Merge, self.merge(&units))?;
                self.checkpoint(StageRecord::Merged(merged.clone()));
                let translated = self.translate(&merged).await?;
                self.checkpoint(StageRecord::Translated(translated.clone()));
                let clips = self.synthesize(&translated).await?;
                output.merged = Some(merged);
                output.translated = Some(translated);
                clips
            }
            StageRecord::Merged(units) => {
                let translated = self.translate(&units).await?;
                self.checkpoint(StageRecord::Translated(translated.clone()));
                let clips = self.synthesize(&translated).await?;
                output.merged = Some(units);
                output.translated = Some(translated);
                clips
            }
            StageRecord::Translated(units) => {
                let clips = self.synthesize(&units).await?;
                output.translated = Some(units);
                clips
            }
            StageRecord::Synthesized(clips) => self.require(Stage::Synthesize, clips)?,
        };
        self.checkpoint(StageRecord::Synthesized(clips.clone()));

        let placements = self.render_clips(self.plan(&clips)).await;
        let track = self.assemble(&placements);
        if track.is_empty() {
            return Err(DubError::EmptyStage(Stage::Assemble.to_string()));
        }

        info!(
            "Track ready: {} clips over {:.3}s ({:.3}s silence)",
            track.clip_count(),
            track.end(),
            track.silence_total()
        );

        output.clips = clips;
        output.placements = placements;
        output.track = track;
        Ok(output)
    }

    fn require<T>(&self, stage: Stage, items: Vec<T>) -> Result<Vec<T>, DubError> {
        if items.is_empty() {
            Err(DubError::EmptyStage(stage.to_string()))
        } else {
            Ok(items)
        }
    }

    fn checkpoint(&self, record: StageRecord) {
        if let Some(dir) = &self.checkpoint_dir {
            if let Err(e) = record.save(dir) {
                warn!("Could not save {} record: {:#}", record.stage_name(), e);
            }
        }
    }
}
