/*!
 * Tests for the controller entry points that run without external tools
 */

use anyhow::Result;
use std::time::Duration;

use dubwai::app_config::{Config, TimingConfig};
use dubwai::app_controller::{self, Controller, DubInput};
use dubwai::caption;
use dubwai::diagnostics::NullSink;
use crate::common::{self, SAMPLE_SRT, SAMPLE_VTT};

fn controller_in(work_dir: &std::path::Path) -> Result<Controller> {
    let config = Config {
        work_dir: work_dir.to_path_buf(),
        ..Config::default()
    };
    Controller::with_config(config)
}

#[test]
fn test_withConfig_withBrokenTiming_shouldFail() {
    let config = Config {
        timing: TimingConfig { max_group_duration: -1.0, ..TimingConfig::default() },
        ..Config::default()
    };

    assert!(Controller::with_config(config).is_err());
}

#[test]
fn test_mergeFile_withVttInput_shouldWriteMergedSrt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "talk.en.vtt", SAMPLE_VTT)?;
    let output = temp_dir.path().join("talk.merged.srt");
    let controller = controller_in(temp_dir.path())?;

    let merged = controller.merge_file(&input, &output)?;

    assert_eq!(merged.len(), 2);
    let written = std::fs::read_to_string(&output)?;
    assert!(written.starts_with("1\n00:00:00,000 --> 00:00:05,000\nHello there. how are you today?"));
    assert_eq!(caption::parse_captions(&output, &NullSink)?, merged);
    Ok(())
}

#[test]
fn test_mergeFile_withVttOutput_shouldWriteWebVtt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "talk.srt", SAMPLE_SRT)?;
    let output = temp_dir.path().join("talk.merged.VTT");
    let controller = controller_in(temp_dir.path())?;

    let merged = controller.merge_file(&input, &output)?;

    let written = std::fs::read_to_string(&output)?;
    assert!(written.starts_with("WEBVTT"));
    assert_eq!(caption::parse_captions(&output, &NullSink)?.len(), merged.len());
    Ok(())
}

#[test]
fn test_mergeFile_withMissingInput_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = controller_in(temp_dir.path())?;

    let result = controller.merge_file(&temp_dir.path().join("none.vtt"), &temp_dir.path().join("out.srt"));

    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_run_withMissingLocalVideo_shouldFailBeforeAnyStage() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let captions = common::create_test_file(temp_dir.path(), "talk.en.vtt", SAMPLE_VTT)?;
    let controller = controller_in(&temp_dir.path().join("work"))?;

    let result = controller
        .run(DubInput::Local {
            video: temp_dir.path().join("talk.mp4"),
            captions,
        })
        .await;

    let message = format!("{:#}", result.expect_err("a missing video must stop the run"));
    assert!(message.contains("Input file does not exist"), "unexpected: {}", message);
    // Work layout exists but nothing was recorded
    assert!(temp_dir.path().join("work/talk").is_dir());
    assert!(!temp_dir.path().join("work/talk").join(app_controller::ISSUE_LOG_NAME).exists());
    Ok(())
}

#[test]
fn test_formatDuration_shouldPickUnitsByMagnitude() {
    assert_eq!(app_controller::format_duration(Duration::from_millis(2_345)), "2.345s");
    assert_eq!(app_controller::format_duration(Duration::from_secs(125)), "2m 5s");
    assert_eq!(app_controller::format_duration(Duration::from_secs(3_725)), "1h 2m 5s");
}
