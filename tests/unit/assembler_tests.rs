/*!
 * Tests for track assembly
 */

use rand::Rng;

use dubwai::app_config::TimingConfig;
use dubwai::diagnostics::{MemorySink, NullSink, Stage};
use dubwai::errors::DubError;
use dubwai::timing::{
    AudioHandle, ClipPlanner, ClipProbe, PlannedDurations, SegmentKind, TimedPlacement, TrackAssembler,
};
use crate::common::clip;

fn placement(index: usize, start: f64, end: f64, source_duration: f64, speed: f64, trailing: f64) -> TimedPlacement {
    let source = AudioHandle::new(format!("tts/speech_{}.wav", index));
    TimedPlacement {
        index,
        text: format!("unit {}", index),
        window_start: start,
        window_end: end,
        source_duration,
        speed_factor: speed,
        trailing_silence: trailing,
        effective_audio: if speed == 1.0 { source.clone() } else { source.adjusted() },
        source_audio: source,
    }
}

fn assembler() -> TrackAssembler {
    TrackAssembler::new(&TimingConfig::default())
}

/// Probe reporting fixed durations per unit index, failing for unknown ones
struct FixedProbe(Vec<(usize, f64)>);

impl ClipProbe for FixedProbe {
    fn effective_duration(&self, placement: &TimedPlacement) -> Result<f64, DubError> {
        self.0
            .iter()
            .find(|(index, _)| *index == placement.index)
            .map(|(_, duration)| *duration)
            .ok_or_else(|| DubError::AssemblyIo {
                index: placement.index,
                message: "missing".to_string(),
            })
    }
}

#[test]
fn test_assemble_withLeadingGap_shouldStartWithSilence() {
    let placements = vec![placement(1, 2.0, 4.0, 2.0, 1.0, 0.0)];

    let track = assembler().assemble(&placements, &PlannedDurations, &NullSink);

    assert_eq!(track.segments.len(), 2);
    assert!(track.segments[0].is_silence());
    assert_eq!(track.segments[0].start, 0.0);
    assert!((track.segments[0].duration - 2.0).abs() < 1e-9);
    assert_eq!(track.segments[1].start, 2.0);
    assert!(track.is_contiguous());
}

#[test]
fn test_assemble_withShortClip_shouldPadToWindowEnd() {
    let placements = vec![
        placement(1, 0.0, 3.0, 1.5, 0.9, 1.333),
        placement(2, 3.0, 5.0, 2.0, 1.0, 0.0),
    ];

    let track = assembler().assemble(&placements, &PlannedDurations, &NullSink);

    assert_eq!(track.segments.len(), 3);
    assert!((track.segments[0].duration - 1.5 / 0.9).abs() < 1e-9);
    assert!(track.segments[1].is_silence());
    assert!((track.segments[1].end() - 3.0).abs() < 1e-9);
    assert_eq!(track.segments[2].start, 3.0);
    assert!((track.end() - 5.0).abs() < 1e-9);
    assert!(track.is_contiguous());
}

#[test]
fn test_assemble_withMeasuredDrift_shouldEndTrailingSilenceAtWindowEnd() {
    // Tempo change came out 40ms longer than planned
    let placements = vec![placement(1, 0.0, 3.0, 1.5, 0.9, 1.333)];
    let probe = FixedProbe(vec![(1, 1.5 / 0.9 + 0.04)]);

    let track = assembler().assemble(&placements, &probe, &NullSink);

    assert_eq!(track.segments.len(), 2);
    assert!((track.end() - 3.0).abs() < 1e-9);
}

#[test]
fn test_assemble_withTinyTrailingGap_shouldSkipItAndStayContiguous() {
    let placements = vec![
        placement(1, 0.0, 3.0, 2.0, 0.9, 0.4),
        placement(2, 3.0, 4.0, 1.0, 1.0, 0.0),
    ];
    let probe = FixedProbe(vec![(1, 2.9), (2, 1.0)]);

    let track = assembler().assemble(&placements, &probe, &NullSink);

    // No trailing pad after clip 1; the 0.1s reappears as lead silence of clip 2
    assert!(track.segments[1].is_silence());
    assert!((track.segments[1].duration - 0.1).abs() < 1e-9);
    assert_eq!(track.segments[2].start, 3.0);
    assert!(track.is_contiguous());
}

#[test]
fn test_assemble_withOverrun_shouldShiftNextClipAndReport() {
    let sink = MemorySink::new();
    let placements = vec![
        placement(1, 0.0, 2.0, 3.0, 1.5, 0.0),
        placement(2, 2.5, 4.0, 1.0, 1.0, 0.0),
    ];
    let probe = FixedProbe(vec![(1, 3.0), (2, 1.0)]);

    let track = assembler().assemble(&placements, &probe, &sink);

    assert_eq!(track.segments.len(), 2);
    assert_eq!(track.segments[1].start, 3.0);
    assert!(track.is_contiguous());
    let events = sink.for_stage(Stage::Assemble);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].error, DubError::TimingInconsistency { index: 2, .. }));
}

#[test]
fn test_assemble_withUnreadableClip_shouldSkipAndReport() {
    let sink = MemorySink::new();
    let placements = vec![
        placement(1, 0.0, 1.0, 1.0, 1.0, 0.0),
        placement(2, 1.0, 2.0, 1.0, 1.0, 0.0),
        placement(3, 2.0, 3.0, 1.0, 1.0, 0.0),
    ];
    let probe = FixedProbe(vec![(1, 1.0), (3, 1.0)]);

    let track = assembler().assemble(&placements, &probe, &sink);

    assert_eq!(track.clip_count(), 2);
    assert!(track.segments[1].is_silence());
    assert!((track.segments[1].duration - 1.0).abs() < 1e-9);
    assert!(matches!(sink.events()[0].error, DubError::AssemblyIo { index: 2, .. }));
}

#[test]
fn test_assemble_withUnsortedPlacements_shouldOrderByWindowStart() {
    let placements = vec![
        placement(2, 5.0, 6.0, 1.0, 1.0, 0.0),
        placement(1, 1.0, 2.0, 1.0, 1.0, 0.0),
    ];

    let track = assembler().assemble(&placements, &PlannedDurations, &NullSink);

    let order: Vec<usize> = track
        .segments
        .iter()
        .filter_map(|segment| match &segment.kind {
            SegmentKind::Clip { index, .. } => Some(*index),
            SegmentKind::Silence => None,
        })
        .collect();
    assert_eq!(order, vec![1, 2]);
}

#[test]
fn test_assemble_withNoPlacements_shouldReturnEmptyTrack() {
    let track = assembler().assemble(&[], &PlannedDurations, &NullSink);

    assert!(track.is_empty());
    assert_eq!(track.end(), 0.0);
    assert!(track.is_contiguous());
}

#[test]
fn test_assemble_withRandomPlannedClips_shouldBeContiguousFromZero() {
    let mut rng = rand::rng();
    let config = TimingConfig::default();
    let planner = ClipPlanner::new(&config);
    let assembler = TrackAssembler::new(&config);

    for _ in 0..100 {
        let mut cursor = 0.0_f64;
        let clips: Vec<_> = (1..=40)
            .map(|i| {
                cursor += rng.random_range(0.0..3.0);
                let start = cursor;
                cursor += rng.random_range(0.3..6.0);
                clip(i, start, cursor, rng.random_range(0.1..8.0))
            })
            .collect();

        let placements = planner.plan_all(&clips, &NullSink);
        let track = assembler.assemble(&placements, &PlannedDurations, &NullSink);

        assert_eq!(track.clip_count(), clips.len());
        assert!(track.is_contiguous());
        assert!(track.segments.iter().all(|segment| segment.duration > 0.0));
    }
}
