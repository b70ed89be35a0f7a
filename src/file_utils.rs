use anyhow::{Result, Context};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Find files with one of the given extensions, sorted by path
    pub fn find_files<P: AsRef<Path>>(dir: P, extensions: &[&str]) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            let matches = path.is_file()
                && path.extension().is_some_and(|ext| {
                    let ext = ext.to_string_lossy();
                    extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted.trim_start_matches('.')))
                });
            if matches {
                result.push(path.to_path_buf());
            }
        }

        result.sort();
        Ok(result)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file, creating parent directories
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                Self::ensure_dir(parent)?;
            }
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))
    }

    /// Whether the extension is one of the common video containers
    pub fn is_video_file<P: AsRef<Path>>(path: P) -> bool {
        const VIDEO_EXTENSIONS: [&str; 10] = ["mp4", "mkv", "avi", "mov", "webm", "m4v", "flv", "wmv", "mpg", "mpeg"];

        path.as_ref()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
    }
}

/// Folder layout of one dubbing job
#[derive(Debug, Clone)]
pub struct WorkLayout {
    pub root: PathBuf,
    // @field: Extracted and separated source audio
    pub audio: PathBuf,
    // @field: Source captions as downloaded
    pub subtitles: PathBuf,
    // @field: Stage records and translated captions
    pub translations: PathBuf,
    // @field: Per-unit speech renders
    pub tts: PathBuf,
    // @field: Final track and video
    pub output: PathBuf,
}

impl WorkLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            audio: root.join("audio"),
            subtitles: root.join("subtitles"),
            translations: root.join("translations"),
            tts: root.join("tts"),
            output: root.join("output"),
            root,
        }
    }

    /// Create every folder of the layout
    pub fn create(&self) -> Result<()> {
        for dir in [&self.root, &self.audio, &self.subtitles, &self.translations, &self.tts, &self.output] {
            FileManager::ensure_dir(dir)?;
        }
        Ok(())
    }
}
