use log::debug;

use crate::app_config::TimingConfig;
use crate::diagnostics::{DiagnosticsSink, Stage};
use crate::errors::DubError;

use super::{SynthesizedClip, TimedPlacement};

// @module: Per-clip speed and padding decisions

/// Result of planning one clip; the flag is informational, planning never fails
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub placement: TimedPlacement,
    pub flag: Option<DubError>,
}

/// Decides how a synthesized clip is stretched or padded to fill its window
#[derive(Debug, Clone)]
pub struct ClipPlanner {
    // @field: Clips shorter than this share of the window are treated as short
    short_clip_ratio: f64,
    // @field: Fixed rate applied to short clips
    mild_slowdown_factor: f64,
    // @field: Leftover below this is not padded by the planner (seconds)
    min_trailing_silence: f64,
    // @field: Compression above this is reported
    extreme_speed_factor: f64,
}

impl ClipPlanner {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            short_clip_ratio: config.short_clip_ratio,
            mild_slowdown_factor: config.mild_slowdown_factor,
            min_trailing_silence: config.min_trailing_silence,
            extreme_speed_factor: config.extreme_speed_factor,
        }
    }

    /// Plan a single clip
    pub fn plan(&self, clip: &SynthesizedClip) -> PlanOutcome {
        let unit = &clip.unit;
        let window = unit.end - unit.start;
        let duration = clip.source_duration;

        let (speed_factor, trailing_silence, flag) = if window <= 0.0 {
            (
                1.0,
                0.0,
                Some(DubError::TimingInconsistency {
                    index: unit.index,
                    message: format!("window of {:.3}s cannot hold any audio", window),
                }),
            )
        } else if duration <= 0.0 {
            (
                1.0,
                window,
                Some(DubError::TimingInconsistency {
                    index: unit.index,
                    message: format!("clip duration {:.3}s, window filled with silence", duration),
                }),
            )
        } else if duration < self.short_clip_ratio * window {
            let remaining = window - duration / self.mild_slowdown_factor;
            let trailing = if remaining > self.min_trailing_silence { remaining } else { 0.0 };
            (self.mild_slowdown_factor, trailing, None)
        } else {
            let speed = duration / window;
            let flag = (speed > self.extreme_speed_factor).then(|| DubError::ExtremeSpeechRate {
                index: unit.index,
                factor: speed,
            });
            (speed, 0.0, flag)
        };

        let mut placement = TimedPlacement {
            index: unit.index,
            text: unit.text.clone(),
            window_start: unit.start,
            window_end: unit.end,
            source_duration: duration,
            speed_factor,
            trailing_silence,
            source_audio: clip.audio.clone(),
            effective_audio: clip.audio.clone(),
        };
        if placement.needs_tempo_change() {
            placement.effective_audio = clip.audio.adjusted();
        }

        debug!(
            "Unit {}: window {:.3}s, clip {:.3}s, speed {:.3}, trailing {:.3}s",
            placement.index, window, duration, speed_factor, trailing_silence
        );

        PlanOutcome { placement, flag }
    }

    /// Plan every clip in order, reporting flags to the sink
    pub fn plan_all(&self, clips: &[SynthesizedClip], sink: &dyn DiagnosticsSink) -> Vec<TimedPlacement> {
        clips
            .iter()
            .map(|clip| {
                let outcome = self.plan(clip);
                if let Some(flag) = outcome.flag {
                    sink.report(Stage::Plan, flag);
                }
                outcome.placement
            })
            .collect()
    }
}
