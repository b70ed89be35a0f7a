use log::debug;

use crate::app_config::TimingConfig;
use crate::diagnostics::{DiagnosticsSink, Stage};
use crate::errors::DubError;

use super::{SegmentKind, TimedPlacement, Track, TrackSegment, TIMING_EPSILON};

// @module: Track assembly from planned clips

/// Measures how long the rendered (speed-adjusted) audio of a placement lasts
pub trait ClipProbe: Send + Sync {
    fn effective_duration(&self, placement: &TimedPlacement) -> Result<f64, DubError>;
}

/// Probe that trusts the plan instead of reading audio
#[derive(Debug, Default, Clone, Copy)]
pub struct PlannedDurations;

impl ClipProbe for PlannedDurations {
    fn effective_duration(&self, placement: &TimedPlacement) -> Result<f64, DubError> {
        Ok(placement.planned_duration())
    }
}

/// Lays placements on a single timeline with silence filling the gaps
#[derive(Debug, Clone)]
pub struct TrackAssembler {
    // @field: Trailing padding shorter than this is skipped (seconds)
    min_gap_silence: f64,
}

impl TrackAssembler {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            min_gap_silence: config.min_gap_silence,
        }
    }

    /// Build the output track.
    ///
    /// Leading gaps come from the window starts; trailing padding is derived
    /// from the measured clip length so drift from the tempo change does not
    /// accumulate. A clip whose window starts before the cursor (the previous
    /// clip overran) is pushed back to the cursor.
    pub fn assemble(
        &self,
        placements: &[TimedPlacement],
        probe: &dyn ClipProbe,
        sink: &dyn DiagnosticsSink,
    ) -> Track {
        let mut ordered: Vec<&TimedPlacement> = placements.iter().collect();
        ordered.sort_by(|a, b| a.window_start.total_cmp(&b.window_start));

        let mut segments = Vec::new();
        let mut cursor = 0.0_f64;

        for placement in ordered {
            let measured = match probe.effective_duration(placement) {
                Ok(duration) if duration > 0.0 => duration,
                Ok(duration) => {
                    sink.report(Stage::Assemble, DubError::AssemblyIo {
                        index: placement.index,
                        message: format!("rendered clip has no audio ({:.3}s)", duration),
                    });
                    continue;
                }
                Err(e) => {
                    sink.report(Stage::Assemble, e);
                    continue;
                }
            };

            let lead = placement.window_start - cursor;
            if lead > TIMING_EPSILON {
                segments.push(TrackSegment {
                    start: cursor,
                    duration: lead,
                    kind: SegmentKind::Silence,
                });
                cursor = placement.window_start;
            } else if lead < -TIMING_EPSILON {
                sink.report(Stage::Assemble, DubError::TimingInconsistency {
                    index: placement.index,
                    message: format!("starts {:.3}s late after the previous clip overran", -lead),
                });
            }

            segments.push(TrackSegment {
                start: cursor,
                duration: measured,
                kind: SegmentKind::Clip {
                    index: placement.index,
                    audio: placement.effective_audio.clone(),
                },
            });
            cursor += measured;

            if placement.trailing_silence > 0.0 {
                let needed = placement.window_end - cursor;
                if needed > self.min_gap_silence {
                    segments.push(TrackSegment {
                        start: cursor,
                        duration: needed,
                        kind: SegmentKind::Silence,
                    });
                    cursor = placement.window_end;
                }
            }
        }

        let track = Track { segments };
        debug!(
            "Assembled track: {} clips, {:.3}s of silence, ends at {:.3}s",
            track.clip_count(),
            track.silence_total(),
            track.end()
        );
        track
    }
}
