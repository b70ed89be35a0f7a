/*!
 * Tests for WAV handling, track rendering and tool helpers
 */

use anyhow::Result;
use std::time::Duration;

use dubwai::diagnostics::{MemorySink, NullSink, Stage};
use dubwai::errors::{AppError, DubError};
use dubwai::media::{self, WavProbe};
use dubwai::timing::{AudioHandle, ClipProbe, SegmentKind, TimedPlacement, Track, TrackSegment};
use crate::common::{self, TEST_SAMPLE_RATE};

#[test]
fn test_atempoChain_withFactorsInRange_shouldUseSingleFilter() {
    assert_eq!(media::atempo_chain(1.5), "atempo=1.500000");
    assert_eq!(media::atempo_chain(0.9), "atempo=0.900000");
}

#[test]
fn test_atempoChain_withFactorsOutOfRange_shouldChainFilters() {
    assert_eq!(media::atempo_chain(3.0), "atempo=2.0,atempo=1.500000");
    assert_eq!(media::atempo_chain(5.0), "atempo=2.0,atempo=2.0,atempo=1.250000");
    assert_eq!(media::atempo_chain(0.3), "atempo=0.5,atempo=0.600000");
}

#[test]
fn test_atempoChain_withInvalidFactor_shouldKeepTempo() {
    assert_eq!(media::atempo_chain(0.0), "atempo=1.000000");
    assert_eq!(media::atempo_chain(f64::NAN), "atempo=1.000000");
}

#[test]
fn test_writeSilenceWav_shouldReportWrittenDuration() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("silence.wav");

    let written = media::write_silence_wav(&path, 1.23456, TEST_SAMPLE_RATE)?;

    assert!((written - 1.23456).abs() < 1.0 / TEST_SAMPLE_RATE as f64);
    assert_eq!(media::wav_duration(&path)?, written);
    Ok(())
}

#[test]
fn test_readMonoSamples_withStereoInput_shouldAverageChannels() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("stereo.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for _ in 0..100 {
        writer.write_sample(16384i16)?;
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;

    let samples = media::read_mono_samples(&path, TEST_SAMPLE_RATE)?;

    assert_eq!(samples.len(), 100);
    assert!(samples.iter().all(|s| (s - 0.25).abs() < 1e-3));
    Ok(())
}

#[test]
fn test_resampleLinear_shouldScaleLength() {
    let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();

    assert_eq!(media::resample_linear(&samples, 8_000, 16_000).len(), 200);
    assert_eq!(media::resample_linear(&samples, 16_000, 8_000).len(), 50);
    assert_eq!(media::resample_linear(&samples, 8_000, 8_000), samples);
}

fn clip_segment(start: f64, duration: f64, index: usize, audio: AudioHandle) -> TrackSegment {
    TrackSegment { start, duration, kind: SegmentKind::Clip { index, audio } }
}

fn silence_segment(start: f64, duration: f64) -> TrackSegment {
    TrackSegment { start, duration, kind: SegmentKind::Silence }
}

#[test]
fn test_renderTrack_shouldMatchTrackLengthToTheSample() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let clip_path = temp_dir.path().join("speech_1.wav");
    let samples: Vec<i16> = (0..TEST_SAMPLE_RATE).map(|i| (i % 100) as i16 * 100).collect();
    media::write_pcm_wav(&clip_path, &samples, TEST_SAMPLE_RATE)?;

    let track = Track {
        segments: vec![
            silence_segment(0.0, 0.5),
            clip_segment(0.5, 1.0, 1, AudioHandle::new(&clip_path)),
            silence_segment(1.5, 0.5),
        ],
    };
    let output = temp_dir.path().join("track.wav");

    let duration = media::render_track(&track, &output, TEST_SAMPLE_RATE, &NullSink)?;

    assert_eq!(duration, 2.0);
    assert_eq!(media::wav_duration(&output)?, 2.0);
    Ok(())
}

#[test]
fn test_renderTrack_withOtherSampleRate_shouldResampleClip() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let clip_path = temp_dir.path().join("speech_1.wav");
    media::write_silence_wav(&clip_path, 1.0, 24_000)?;

    let track = Track {
        segments: vec![clip_segment(0.0, 1.0, 1, AudioHandle::new(&clip_path))],
    };
    let output = temp_dir.path().join("track.wav");

    let duration = media::render_track(&track, &output, TEST_SAMPLE_RATE, &NullSink)?;

    assert_eq!(duration, 1.0);
    Ok(())
}

#[test]
fn test_renderTrack_withMissingClip_shouldFillSilenceAndReport() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let track = Track {
        segments: vec![
            clip_segment(0.0, 1.0, 4, AudioHandle::new(temp_dir.path().join("missing.wav"))),
            silence_segment(1.0, 0.25),
        ],
    };
    let output = temp_dir.path().join("track.wav");
    let sink = MemorySink::new();

    let duration = media::render_track(&track, &output, TEST_SAMPLE_RATE, &sink)?;

    assert_eq!(duration, 1.25);
    let events = sink.for_stage(Stage::Render);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].error, DubError::AssemblyIo { index: 4, .. }));
    Ok(())
}

#[test]
fn test_wavProbe_shouldReadEffectiveAudio() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = AudioHandle::new(temp_dir.path().join("speech_1.wav"));
    media::write_silence_wav(source.adjusted().path(), 0.75, TEST_SAMPLE_RATE)?;
    let placement = TimedPlacement {
        index: 1,
        text: "x".to_string(),
        window_start: 0.0,
        window_end: 1.0,
        source_duration: 0.9,
        speed_factor: 1.2,
        trailing_silence: 0.0,
        effective_audio: source.adjusted(),
        source_audio: source,
    };

    assert_eq!(WavProbe.effective_duration(&placement)?, 0.75);

    let missing = TimedPlacement { effective_audio: AudioHandle::new("nope.wav"), ..placement };
    assert!(matches!(WavProbe.effective_duration(&missing), Err(DubError::AssemblyIo { index: 1, .. })));
    Ok(())
}

#[test]
fn test_videoId_withCommonUrls_shouldExtractId() -> Result<()> {
    assert_eq!(media::video_id("https://www.youtube.com/watch?v=abc123XYZ_-&t=10s")?, "abc123XYZ_-");
    assert_eq!(media::video_id("https://youtu.be/xyz987")?, "xyz987");
    assert_eq!(media::video_id("https://vimeo.com/12345/")?, "12345");
    assert!(media::video_id("not a url").is_err());
    assert!(media::video_id("https://example.com/").is_err());
    Ok(())
}

#[test]
fn test_filterFfmpegStderr_shouldDropBannerLines() {
    let stderr = "ffmpeg version 6.0\n  built with gcc\n  libavutil 58\nInput #0, wav\n[atempo] Invalid value 0.1\n";

    assert_eq!(media::filter_ffmpeg_stderr(stderr), "[atempo] Invalid value 0.1");
    assert!(media::filter_ffmpeg_stderr("ffmpeg version 6.0\n").contains("unknown error"));
}

#[tokio::test]
async fn test_runTool_withMissingProgram_shouldReturnToolError() {
    let result = media::run_tool("dubwai-no-such-tool", &[], Duration::from_secs(5)).await;

    assert!(matches!(result, Err(AppError::Tool(_))));
}
