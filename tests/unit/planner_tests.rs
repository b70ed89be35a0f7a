/*!
 * Tests for clip timing decisions
 */

use rand::Rng;

use dubwai::app_config::TimingConfig;
use dubwai::diagnostics::{MemorySink, Stage};
use dubwai::errors::DubError;
use dubwai::timing::{AudioHandle, ClipPlanner};
use crate::common::clip;

fn planner() -> ClipPlanner {
    ClipPlanner::new(&TimingConfig::default())
}

#[test]
fn test_plan_withShortClip_shouldSlowDownAndPad() {
    let outcome = planner().plan(&clip(1, 10.0, 13.0, 1.5));
    let placement = outcome.placement;

    assert!(outcome.flag.is_none());
    assert!((placement.speed_factor - 0.9).abs() < 1e-9);
    assert!((placement.trailing_silence - 1.333).abs() < 0.001);
    assert_eq!(placement.window_start, 10.0);
    assert_eq!(placement.effective_audio, AudioHandle::new("tts/speech_1_adjusted.wav"));
    assert_eq!(placement.source_audio, AudioHandle::new("tts/speech_1.wav"));
}

#[test]
fn test_plan_withLongClip_shouldCompressToWindow() {
    let outcome = planner().plan(&clip(2, 0.0, 2.0, 3.0));

    assert!(outcome.flag.is_none());
    assert!((outcome.placement.speed_factor - 1.5).abs() < 1e-9);
    assert_eq!(outcome.placement.trailing_silence, 0.0);
    assert!((outcome.placement.planned_duration() - 2.0).abs() < 1e-9);
}

#[test]
fn test_plan_withVeryLongClip_shouldFlagExtremeSpeechRate() {
    let outcome = planner().plan(&clip(3, 0.0, 1.0, 2.5));

    assert!((outcome.placement.speed_factor - 2.5).abs() < 1e-9);
    match outcome.flag {
        Some(DubError::ExtremeSpeechRate { index, factor }) => {
            assert_eq!(index, 3);
            assert!((factor - 2.5).abs() < 1e-9);
        }
        other => panic!("expected ExtremeSpeechRate, got {:?}", other),
    }
}

#[test]
fn test_plan_withSmallLeftover_shouldNotPlanTrailingSilence() {
    // 1.0 - 0.65 / 0.9 leaves about 0.278s, under the 0.3s minimum
    let outcome = planner().plan(&clip(4, 0.0, 1.0, 0.65));

    assert!((outcome.placement.speed_factor - 0.9).abs() < 1e-9);
    assert_eq!(outcome.placement.trailing_silence, 0.0);
}

#[test]
fn test_plan_withZeroWindow_shouldFlagAndKeepSpeed() {
    let outcome = planner().plan(&clip(5, 2.0, 2.0, 1.0));

    assert_eq!(outcome.placement.speed_factor, 1.0);
    assert_eq!(outcome.placement.trailing_silence, 0.0);
    assert!(matches!(outcome.flag, Some(DubError::TimingInconsistency { index: 5, .. })));
}

#[test]
fn test_plan_withEmptyClip_shouldFillWindowWithSilence() {
    let outcome = planner().plan(&clip(6, 1.0, 4.0, 0.0));

    assert_eq!(outcome.placement.speed_factor, 1.0);
    assert!((outcome.placement.trailing_silence - 3.0).abs() < 1e-9);
    assert!(matches!(outcome.flag, Some(DubError::TimingInconsistency { index: 6, .. })));
}

#[test]
fn test_planAll_withFlags_shouldReportToSink() {
    let sink = MemorySink::new();
    let clips = vec![clip(1, 0.0, 2.0, 2.0), clip(2, 2.0, 3.0, 5.0)];

    let placements = planner().plan_all(&clips, &sink);

    assert_eq!(placements.len(), 2);
    assert_eq!(sink.for_stage(Stage::Plan).len(), 1);
    assert_eq!(sink.events()[0].error.unit_index(), Some(2));
}

#[test]
fn test_plan_withRandomClips_shouldFillWindowOrStayInside() {
    let mut rng = rand::rng();
    let planner = planner();

    for i in 0..1000 {
        let window = rng.random_range(0.2..10.0);
        let duration = rng.random_range(0.05..20.0);
        let placement = planner.plan(&clip(i, 0.0, window, duration)).placement;

        let filled = duration / placement.speed_factor + placement.trailing_silence;
        if placement.speed_factor == 0.9 {
            assert!(filled <= window + 0.001, "short clip overflows: {} > {}", filled, window);
        } else {
            assert!((filled - window).abs() <= 0.001, "{} does not fill {}", filled, window);
        }
    }
}
