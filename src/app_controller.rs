use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::caption::{self, CaptionUnit};
use crate::checkpoint::StageRecord;
use crate::diagnostics::{self, DiagnosticsSink, LogSink, MemorySink};
use crate::file_utils::{FileManager, WorkLayout};
use crate::media::{self, MediaTools, WavProbe};
use crate::pipeline::DubPipeline;
use crate::providers;
use crate::synthesis::SynthesisStage;
use crate::timing::SegmentMerger;
use crate::translation::TranslationStage;

// @module: Application controller for dubbing jobs

/// Name of the per-job issue log
pub const ISSUE_LOG_NAME: &str = "dubwai.issues.log";

/// Where a dubbing job starts from
#[derive(Debug, Clone)]
pub enum DubInput {
    /// Video page to download together with its captions
    Url(String),
    /// Video and caption files already on disk
    Local { video: PathBuf, captions: PathBuf },
    /// Video plus a stage record written by an earlier run
    Record { video: PathBuf, record: PathBuf },
}

/// Files and figures produced by one job
#[derive(Debug, Clone)]
pub struct DubOutcome {
    pub work_dir: PathBuf,
    pub video: PathBuf,
    pub track: PathBuf,
    pub translated_captions: PathBuf,
    pub clips: usize,
    pub track_duration: f64,
    pub issues: usize,
    // @field: Only set when something was reported
    pub issue_log: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Main application controller for video dubbing
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.timing.validate().context("Invalid timing configuration")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a complete dubbing job
    pub async fn run(&self, input: DubInput) -> Result<DubOutcome> {
        let start_time = Instant::now();
        let layout = WorkLayout::new(self.work_root(&input)?);
        layout.create()?;
        info!("Working in {:?}", layout.root);

        let sink = Arc::new(MemorySink::new());
        let tools = Arc::new(MediaTools::new(self.config.media.clone(), self.config.speech.sample_rate));

        let (video, record) = self.prepare_input(&input, &layout, tools.as_ref(), sink.as_ref()).await?;

        let progress = ProgressBar::new(0);
        progress.set_style(progress_style("clips"));
        progress.set_message("Synthesizing speech");

        let pipeline = self.build_pipeline(&layout, tools.clone(), sink.clone(), progress.clone())?;
        let result = pipeline.run_from(record).await;
        progress.finish_and_clear();
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                // Per-unit reasons are only in the sink, keep them for the user
                let issue_path = layout.root.join(ISSUE_LOG_NAME);
                if diagnostics::write_issue_log(&sink.events(), &issue_path, &e.to_string())? {
                    warn!("Failure details recorded in {:?}", issue_path);
                }
                return Err(e).context("Dubbing pipeline failed");
            }
        };

        let translated_captions = layout
            .translations
            .join(format!("{}.srt", self.config.target_language));
        caption::write_srt(&output.spoken_units(), &translated_captions)?;

        let track_path = layout.output.join("dubbed_track.wav");
        let track = output.track.clone();
        let render_path = track_path.clone();
        let render_sink = sink.clone();
        let sample_rate = self.config.speech.sample_rate;
        let track_duration = tokio::task::spawn_blocking(move || {
            media::render_track(&track, &render_path, sample_rate, render_sink.as_ref())
        })
        .await
        .context("Track rendering task panicked")??;

        let background = self.background_audio(&video, &layout, tools.as_ref()).await;
        let audio_path = layout.output.join("dubbed_audio.m4a");
        match &background {
            Some(background) => tools.mix_with_background(&track_path, background, &audio_path).await?,
            None => tools.encode_aac(&track_path, &audio_path).await?,
        }

        let video_path = layout
            .output
            .join(format!("translated_video_{}.mp4", self.config.target_language));
        tools.mux(&video, &audio_path, &video_path).await?;

        let events = sink.events();
        let issue_path = layout.root.join(ISSUE_LOG_NAME);
        let context = format!(
            "{} -> {}, {}",
            self.config.source_language,
            self.config.target_language,
            video.display()
        );
        let issue_log = diagnostics::write_issue_log(&events, &issue_path, &context)?.then_some(issue_path);
        if let Some(path) = &issue_log {
            warn!("{} issues recorded in {:?}", events.len(), path);
        }

        let elapsed = start_time.elapsed();
        info!("Dubbed {:?} in {}", video_path, format_duration(elapsed));

        Ok(DubOutcome {
            work_dir: layout.root.clone(),
            video: video_path,
            track: track_path,
            translated_captions,
            clips: output.track.clip_count(),
            track_duration,
            issues: events.len(),
            issue_log,
            elapsed,
        })
    }

    /// Merge the fragments of a caption file and write the result.
    ///
    /// The output format follows the output extension: `.vtt` or SRT otherwise.
    pub fn merge_file(&self, input: &Path, output: &Path) -> Result<Vec<CaptionUnit>> {
        let units = caption::parse_captions(input, &LogSink)?;
        let merged = SegmentMerger::new(&self.config.timing).merge(&units);
        info!("Merged {} caption fragments into {} units", units.len(), merged.len());

        let is_vtt = output
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("vtt"));
        if is_vtt {
            FileManager::write_to_file(output, &caption::to_vtt_string(&merged))?;
        } else {
            caption::write_srt(&merged, output)?;
        }
        Ok(merged)
    }

    fn work_root(&self, input: &DubInput) -> Result<PathBuf> {
        let name = match input {
            DubInput::Url(url) => media::video_id(url)?,
            DubInput::Local { video, .. } | DubInput::Record { video, .. } => video
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .ok_or_else(|| anyhow!("Video path has no file name: {:?}", video))?,
        };
        Ok(self.config.work_dir.join(name))
    }

    async fn prepare_input(
        &self,
        input: &DubInput,
        layout: &WorkLayout,
        tools: &MediaTools,
        sink: &dyn DiagnosticsSink,
    ) -> Result<(PathBuf, StageRecord)> {
        match input {
            DubInput::Url(url) => {
                let downloaded = tools.download(url, &layout.root, &self.config.source_language).await?;
                let captions = downloaded
                    .captions
                    .ok_or_else(|| anyhow!("No {} captions are available for {}", self.config.source_language, url))?;
                let units = self.load_captions(&captions, layout, sink)?;
                Ok((downloaded.video, StageRecord::Captions(units)))
            }
            DubInput::Local { video, captions } => {
                ensure_file(video)?;
                let units = self.load_captions(captions, layout, sink)?;
                Ok((video.clone(), StageRecord::Captions(units)))
            }
            DubInput::Record { video, record } => {
                ensure_file(video)?;
                let record = StageRecord::load(record)?;
                info!("Resuming after the {} stage ({} records)", record.stage_name(), record.len());
                Ok((video.clone(), record))
            }
        }
    }

    fn load_captions(&self, path: &Path, layout: &WorkLayout, sink: &dyn DiagnosticsSink) -> Result<Vec<CaptionUnit>> {
        let units = caption::parse_captions(path, sink)?;
        let record = StageRecord::Captions(units);
        record.save(&layout.translations)?;
        record.into_units()
    }

    fn build_pipeline(
        &self,
        layout: &WorkLayout,
        tools: Arc<MediaTools>,
        sink: Arc<MemorySink>,
        progress: ProgressBar,
    ) -> Result<DubPipeline> {
        let translator = providers::build_translator(&self.config.translation)?;
        let synthesizer = providers::build_synthesizer(&self.config.speech)?;
        info!(
            "Translating with {} ({}), speaking with {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model(),
            synthesizer.name()
        );

        let translation = TranslationStage::from_config(translator, &self.config);
        let synthesis = SynthesisStage::new(synthesizer, &layout.tts, self.config.speech.concurrent_requests)
            .with_progress(progress);

        Ok(DubPipeline::new(
            self.config.timing.clone(),
            translation,
            synthesis,
            tools,
            Arc::new(WavProbe),
            sink,
        )
        .with_render_concurrency(self.config.speech.concurrent_requests)
        .with_checkpoints(&layout.translations))
    }

    /// Background stem of the original audio, when separation is enabled and works
    async fn background_audio(&self, video: &Path, layout: &WorkLayout, tools: &MediaTools) -> Option<PathBuf> {
        if !self.config.media.separate_background {
            return None;
        }

        let original = layout.audio.join("original.wav");
        let separated = async {
            tools.extract_audio(video, &original).await?;
            tools.separate_background(&original, &layout.audio).await
        };

        match separated.await {
            Ok(background) => Some(background),
            Err(e) => {
                warn!("Background separation failed, the dub will carry speech only: {:#}", e);
                None
            }
        }
    }
}

fn ensure_file(path: &Path) -> Result<()> {
    if FileManager::file_exists(path) {
        Ok(())
    } else {
        Err(anyhow!("Input file does not exist: {:?}", path))
    }
}

fn progress_style(unit: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}} {{eta}}",
            unit
        ))
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░")
}

/// Human-readable duration (HH:MM:SS style)
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, duration.subsec_millis())
    }
}
