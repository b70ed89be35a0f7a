use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use crate::app_config::MediaConfig;
use crate::diagnostics::{DiagnosticsSink, Stage};
use crate::errors::{AppError, DubError};
use crate::file_utils::FileManager;
use crate::pipeline::ClipRenderer;
use crate::timing::{ClipProbe, SegmentKind, TimedPlacement, Track};

// @module: External media tools and WAV handling

/// Run an external tool, killing it when it exceeds `timeout`
pub async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<Output, AppError> {
    debug!("Running {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = tokio::select! {
        result = child => {
            result.map_err(|e| AppError::Tool(format!("Failed to execute {}: {}", program, e)))?
        },
        _ = tokio::time::sleep(timeout) => {
            return Err(AppError::Tool(format!("{} timed out after {}s", program, timeout.as_secs())));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Tool(format!("{} failed: {}", program, filter_ffmpeg_stderr(&stderr))));
    }

    Ok(output)
}

/// Keep only the meaningful lines of ffmpeg-style stderr
pub fn filter_ffmpeg_stderr(stderr: &str) -> String {
    const NOISE_PREFIXES: [&str; 12] = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Output #",
        "Metadata:",
        "Duration:",
        "Stream #",
        "Stream mapping:",
        "Press [q]",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !NOISE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}

/// Split a speed factor into `atempo` filters, each within ffmpeg's [0.5, 2.0]
pub fn atempo_chain(speed: f64) -> String {
    let mut remaining = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
    let mut filters = Vec::new();

    while remaining > 2.0 {
        filters.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        filters.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    filters.push(format!("atempo={:.6}", remaining));

    filters.join(",")
}

/// Duration of a WAV file in seconds
pub fn wav_duration<P: AsRef<Path>>(path: P) -> Result<f64> {
    let reader = WavReader::open(path.as_ref())
        .with_context(|| format!("Failed to open WAV file: {:?}", path.as_ref()))?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write 16-bit mono PCM samples to a WAV file
pub fn write_pcm_wav<P: AsRef<Path>>(path: P, samples: &[i16], sample_rate: u32) -> Result<()> {
    let mut writer = WavWriter::create(path.as_ref(), mono_spec(sample_rate))
        .with_context(|| format!("Failed to create WAV file: {:?}", path.as_ref()))?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write a silent mono WAV file, returning the duration actually written
pub fn write_silence_wav<P: AsRef<Path>>(path: P, seconds: f64, sample_rate: u32) -> Result<f64> {
    let count = seconds_to_samples(seconds, sample_rate);
    let mut writer = WavWriter::create(path.as_ref(), mono_spec(sample_rate))
        .with_context(|| format!("Failed to create WAV file: {:?}", path.as_ref()))?;
    for _ in 0..count {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(count as f64 / sample_rate as f64)
}

fn seconds_to_samples(seconds: f64, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}

/// Read a WAV file as mono f32 samples at `target_rate`.
///
/// Channels are averaged and other sample rates are converted by linear
/// interpolation.
pub fn read_mono_samples<P: AsRef<Path>>(path: P, target_rate: u32) -> Result<Vec<f32>> {
    let mut reader = WavReader::open(path.as_ref())
        .with_context(|| format!("Failed to open WAV file: {:?}", path.as_ref()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(anyhow!("Unsupported WAV format: {:?}, {} bits", format, bits));
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

/// Linear-interpolation sample rate conversion
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let out_len = ((samples.len() as f64) * to_rate as f64 / from_rate as f64).round() as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let left = (position.floor() as usize).min(last);
            let right = (left + 1).min(last);
            let fraction = (position - left as f64) as f32;
            samples[left] + (samples[right] - samples[left]) * fraction
        })
        .collect()
}

/// Render an assembled track into one mono WAV file.
///
/// Every segment starts at `round(start * sample_rate)`, so rounding never
/// accumulates across segments. A clip that cannot be read becomes silence and
/// is reported. Returns the rendered duration in seconds.
pub fn render_track<P: AsRef<Path>>(
    track: &Track,
    output: P,
    sample_rate: u32,
    sink: &dyn DiagnosticsSink,
) -> Result<f64> {
    let output = output.as_ref();
    let mut writer = WavWriter::create(output, mono_spec(sample_rate))
        .with_context(|| format!("Failed to create track file: {:?}", output))?;
    let mut written: u64 = 0;

    for segment in &track.segments {
        let segment_start = seconds_to_samples(segment.start, sample_rate);
        let segment_end = seconds_to_samples(segment.end(), sample_rate);

        while written < segment_start {
            writer.write_sample(0i16)?;
            written += 1;
        }

        match &segment.kind {
            SegmentKind::Silence => {
                while written < segment_end {
                    writer.write_sample(0i16)?;
                    written += 1;
                }
            }
            SegmentKind::Clip { index, audio } => match read_mono_samples(audio.path(), sample_rate) {
                Ok(samples) => {
                    for sample in samples {
                        writer.write_sample(to_i16(sample))?;
                        written += 1;
                    }
                }
                Err(e) => {
                    sink.report(Stage::Render, DubError::AssemblyIo {
                        index: *index,
                        message: format!("{:#}", e),
                    });
                    while written < segment_end {
                        writer.write_sample(0i16)?;
                        written += 1;
                    }
                }
            },
        }
    }

    writer.finalize()?;
    let duration = written as f64 / sample_rate as f64;
    info!("Rendered {:.3}s track to {:?}", duration, output);
    Ok(duration)
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Probe reading the rendered WAV header of each placement
#[derive(Debug, Default, Clone, Copy)]
pub struct WavProbe;

impl ClipProbe for WavProbe {
    fn effective_duration(&self, placement: &TimedPlacement) -> Result<f64, DubError> {
        wav_duration(placement.effective_audio.path()).map_err(|e| DubError::AssemblyIo {
            index: placement.index,
            message: format!("{:#}", e),
        })
    }
}

/// Files fetched for a remote video
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub video: PathBuf,
    pub captions: Option<PathBuf>,
}

/// Wrapper around ffmpeg, ffprobe, yt-dlp and spleeter
#[derive(Debug, Clone)]
pub struct MediaTools {
    config: MediaConfig,
    sample_rate: u32,
}

impl MediaTools {
    pub fn new(config: MediaConfig, sample_rate: u32) -> Self {
        Self { config, sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.tool_timeout_secs.max(1))
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<Output, AppError> {
        let mut full = vec!["-y".to_string(), "-hide_banner".to_string(), "-loglevel".to_string(), "error".to_string()];
        full.extend(args);
        run_tool(&self.config.ffmpeg_path, &full, self.timeout()).await
    }

    /// Container-level duration reported by ffprobe
    pub async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path_arg(path),
        ];
        let output = run_tool(&self.config.ffprobe_path, &args, self.timeout()).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<f64>()
            .with_context(|| format!("Unexpected ffprobe duration '{}' for {:?}", text.trim(), path))
    }

    /// Re-time a clip to `speed`, writing mono 16-bit PCM at the track rate
    pub async fn adjust_tempo(&self, input: &Path, output: &Path, speed: f64) -> Result<()> {
        let mut args = vec!["-i".to_string(), path_arg(input)];
        if (speed - 1.0).abs() > f64::EPSILON {
            args.push("-filter:a".to_string());
            args.push(atempo_chain(speed));
        }
        args.extend([
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            path_arg(output),
        ]);
        self.ffmpeg(args).await?;
        Ok(())
    }

    /// Extract the audio stream of a video as WAV
    pub async fn extract_audio(&self, video: &Path, output: &Path) -> Result<()> {
        let args = vec![
            "-i".to_string(),
            path_arg(video),
            "-vn".to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            path_arg(output),
        ];
        self.ffmpeg(args).await?;
        Ok(())
    }

    /// Split voice from background with spleeter, returning the background stem
    pub async fn separate_background(&self, audio: &Path, output_dir: &Path) -> Result<PathBuf> {
        FileManager::ensure_dir(output_dir)?;
        let args = vec![
            "separate".to_string(),
            "-p".to_string(),
            "spleeter:2stems".to_string(),
            "-o".to_string(),
            path_arg(output_dir),
            path_arg(audio),
        ];
        run_tool(&self.config.spleeter_path, &args, self.timeout()).await?;

        let stem = audio.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let background = output_dir.join(stem).join("accompaniment.wav");
        if !background.is_file() {
            return Err(anyhow!("Separation produced no background stem at {:?}", background));
        }
        Ok(background)
    }

    /// Encode speech to AAC on its own
    pub async fn encode_aac(&self, speech: &Path, output: &Path) -> Result<()> {
        let args = vec![
            "-i".to_string(),
            path_arg(speech),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            path_arg(output),
        ];
        self.ffmpeg(args).await?;
        Ok(())
    }

    /// Mix speech over background audio for the longer of the two.
    ///
    /// When mixing fails the speech track is encoded alone.
    pub async fn mix_with_background(&self, speech: &Path, background: &Path, output: &Path) -> Result<()> {
        let args = vec![
            "-i".to_string(),
            path_arg(speech),
            "-i".to_string(),
            path_arg(background),
            "-filter_complex".to_string(),
            "amix=inputs=2:duration=longest".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            path_arg(output),
        ];

        match self.ffmpeg(args).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Background mix failed ({}), using speech only", e);
                self.encode_aac(speech, output).await
            }
        }
    }

    /// Replace the audio of a video, copying the video stream
    pub async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let args = vec![
            "-i".to_string(),
            path_arg(video),
            "-i".to_string(),
            path_arg(audio),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            path_arg(output),
        ];
        self.ffmpeg(args).await?;
        info!("Wrote dubbed video {:?}", output);
        Ok(())
    }

    /// Download a video and its source-language captions with yt-dlp
    pub async fn download(&self, url: &str, output_dir: &Path, language: &str) -> Result<Downloaded> {
        FileManager::ensure_dir(output_dir)?;
        let id = video_id(url)?;
        let template = output_dir.join(format!("{}.%(ext)s", id));

        let args = vec![
            "-f".to_string(),
            self.config.download_format.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--write-subs".to_string(),
            "--write-auto-subs".to_string(),
            "--sub-langs".to_string(),
            format!("{}.*", language),
            "--sub-format".to_string(),
            "vtt".to_string(),
            "-o".to_string(),
            path_arg(&template),
            url.to_string(),
        ];
        run_tool(&self.config.ytdlp_path, &args, self.timeout()).await?;

        let video = FileManager::find_files(output_dir, &["mp4", "mkv", "webm"])?
            .into_iter()
            .find(|path| path.file_stem().is_some_and(|stem| stem.to_string_lossy() == id))
            .ok_or_else(|| anyhow!("yt-dlp finished but no video for {} was found in {:?}", id, output_dir))?;
        let captions = FileManager::find_files(output_dir, &["vtt"])?.into_iter().next();

        if captions.is_none() {
            warn!("No {} captions were downloaded for {}", language, id);
        }
        Ok(Downloaded { video, captions })
    }
}

#[async_trait]
impl ClipRenderer for MediaTools {
    async fn render(&self, placement: &TimedPlacement) -> Result<(), DubError> {
        if !placement.needs_tempo_change() {
            return Ok(());
        }

        self.adjust_tempo(
            placement.source_audio.path(),
            placement.effective_audio.path(),
            placement.speed_factor,
        )
        .await
        .map_err(|e| DubError::AssemblyIo {
            index: placement.index,
            message: format!("{:#}", e),
        })
    }
}

/// Stable identifier for a video URL, used to name the work folder
pub fn video_id(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid video URL: {}", url))?;

    if let Some((_, value)) = parsed.query_pairs().find(|(key, _)| key == "v") {
        if !value.is_empty() {
            return Ok(sanitize_id(&value));
        }
    }

    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(sanitize_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("Cannot derive a video id from {}", url))
}

fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
