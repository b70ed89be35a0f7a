/*!
 * Tests for file helpers and the job folder layout
 */

use anyhow::Result;

use dubwai::file_utils::{FileManager, WorkLayout};
use crate::common;

#[test]
fn test_writeToFile_withMissingParents_shouldCreateThem() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("translations/nested/talk.tt.srt");

    FileManager::write_to_file(&path, "1\n00:00:00,000 --> 00:00:01,000\nSälam\n")?;

    assert!(FileManager::file_exists(&path));
    assert!(FileManager::read_to_string(&path)?.contains("Sälam"));
    Ok(())
}

#[test]
fn test_findFiles_withMixedCase_shouldMatchExtensionsSorted() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_test_file(temp_dir.path(), "b.en.vtt", "WEBVTT\n")?;
    common::create_test_file(temp_dir.path(), "a.en.VTT", "WEBVTT\n")?;
    common::create_test_file(temp_dir.path(), "notes.txt", "")?;
    FileManager::write_to_file(temp_dir.path().join("sub/c.srt"), "")?;

    let found = FileManager::find_files(temp_dir.path(), &["vtt", ".srt"])?;

    let names: Vec<String> = found
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(names, vec!["a.en.VTT", "b.en.vtt", "c.srt"]);
    Ok(())
}

#[test]
fn test_isVideoFile_shouldCheckExtensionOnly() {
    assert!(FileManager::is_video_file("talk.MP4"));
    assert!(FileManager::is_video_file("/tmp/talk.webm"));
    assert!(!FileManager::is_video_file("talk.en.vtt"));
    assert!(!FileManager::is_video_file("talk"));
}

#[test]
fn test_workLayoutCreate_shouldCreateEveryFolder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let layout = WorkLayout::new(temp_dir.path().join("talk"));

    layout.create()?;
    // Creating twice is fine
    layout.create()?;

    for dir in [&layout.audio, &layout.subtitles, &layout.translations, &layout.tts, &layout.output] {
        assert!(dir.is_dir(), "{:?} missing", dir);
        assert_eq!(dir.parent(), Some(layout.root.as_path()));
    }
    Ok(())
}
