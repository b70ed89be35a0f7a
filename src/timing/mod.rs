/*!
 * Segment consolidation and audio-timing synchronization.
 *
 * - `merger`: groups caption fragments into spoken units
 * - `planner`: fits one synthesized clip into its caption window
 * - `assembler`: lays planned clips and silence out on one contiguous track
 *
 * All three are pure: they take owned stage outputs, return fresh ones and
 * report anything unusual through a `DiagnosticsSink`.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::caption::CaptionUnit;

pub mod assembler;
pub mod merger;
pub mod planner;

pub use assembler::{ClipProbe, PlannedDurations, TrackAssembler};
pub use merger::SegmentMerger;
pub use planner::{ClipPlanner, PlanOutcome};

/// Tolerance used for every timing comparison, one millisecond
pub const TIMING_EPSILON: f64 = 0.001;

/// Opaque reference to a piece of rendered audio on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioHandle(PathBuf);

impl AudioHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Sibling path with `_adjusted` inserted before the extension
    pub fn adjusted(&self) -> Self {
        let stem = self.0.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let file_name = match self.0.extension() {
            Some(ext) => format!("{}_adjusted.{}", stem, ext.to_string_lossy()),
            None => format!("{}_adjusted", stem),
        };
        Self(self.0.with_file_name(file_name))
    }
}

impl fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

// @struct: Caption unit paired with its synthesized speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedClip {
    // @field: The unit that was spoken; its window is the target slot
    #[serde(flatten)]
    pub unit: CaptionUnit,

    // @field: Measured length of the render, seconds
    pub source_duration: f64,

    // @field: The render itself
    pub audio: AudioHandle,
}

impl SynthesizedClip {
    pub fn new(unit: CaptionUnit, source_duration: f64, audio: AudioHandle) -> Self {
        Self { unit, source_duration, audio }
    }
}

// @struct: Where and how fast one clip plays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedPlacement {
    pub index: usize,
    pub text: String,
    pub window_start: f64,
    pub window_end: f64,
    pub source_duration: f64,
    // @field: Playback rate, above 1.0 compresses
    pub speed_factor: f64,
    // @field: Silence appended after the clip, seconds
    pub trailing_silence: f64,
    pub source_audio: AudioHandle,
    // @field: Render at `speed_factor`; same as the source when unchanged
    pub effective_audio: AudioHandle,
}

impl TimedPlacement {
    pub fn window(&self) -> f64 {
        self.window_end - self.window_start
    }

    /// Clip length after the tempo change
    pub fn planned_duration(&self) -> f64 {
        if self.speed_factor > 0.0 {
            self.source_duration / self.speed_factor
        } else {
            self.source_duration
        }
    }

    pub fn needs_tempo_change(&self) -> bool {
        (self.speed_factor - 1.0).abs() > f64::EPSILON
    }
}

/// What occupies a stretch of the output track
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentKind {
    Silence,
    Clip {
        index: usize,
        audio: AudioHandle,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    pub start: f64,
    pub duration: f64,
    pub kind: SegmentKind,
}

impl TrackSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn is_silence(&self) -> bool {
        matches!(self.kind, SegmentKind::Silence)
    }
}

/// Contiguous run of silence and clip segments starting at zero
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub segments: Vec<TrackSegment>,
}

impl Track {
    /// End of the last segment, 0 for an empty track
    pub fn end(&self) -> f64 {
        self.segments.last().map(TrackSegment::end).unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clip_count(&self) -> usize {
        self.segments.iter().filter(|s| !s.is_silence()).count()
    }

    pub fn silence_total(&self) -> f64 {
        self.segments.iter().filter(|s| s.is_silence()).map(|s| s.duration).sum()
    }

    /// First segment starts at 0 and each one starts where the previous ended
    pub fn is_contiguous(&self) -> bool {
        let Some(first) = self.segments.first() else {
            return true;
        };
        if first.start.abs() > TIMING_EPSILON {
            return false;
        }
        self.segments
            .windows(2)
            .all(|pair| (pair[0].end() - pair[1].start).abs() <= TIMING_EPSILON)
    }
}
