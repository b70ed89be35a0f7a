/*!
 * Stage records.
 *
 * Each stage's output can be written as a tagged JSON document and read back
 * as the input of the following stage. Records only adapt data; deciding
 * whether a stage can be skipped is left to the caller.
 */

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::caption::CaptionUnit;
use crate::file_utils::FileManager;
use crate::timing::SynthesizedClip;

/// Output of one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "records", rename_all = "snake_case")]
pub enum StageRecord {
    /// Units as parsed from the caption file
    Captions(Vec<CaptionUnit>),
    /// Units after fragment merging
    Merged(Vec<CaptionUnit>),
    /// Units carrying translated text
    Translated(Vec<CaptionUnit>),
    /// Units with their speech renders
    Synthesized(Vec<SynthesizedClip>),
}

impl StageRecord {
    /// Stage name, also the file name prefix
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Captions(_) => "captions",
            Self::Merged(_) => "merged",
            Self::Translated(_) => "translated",
            Self::Synthesized(_) => "synthesized",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Captions(units) | Self::Merged(units) | Self::Translated(units) => units.len(),
            Self::Synthesized(clips) => clips.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `<dir>/<stage>_output.json`
    pub fn file_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_output.json", self.stage_name()))
    }

    /// Write the record into `dir`, returning the file path
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = self.file_path(dir.as_ref());
        let json = serde_json::to_string_pretty(self)
            .with_context(|| format!("Failed to serialize {} record", self.stage_name()))?;
        FileManager::write_to_file(&path, &json)?;
        info!("Saved {} {} records to {:?}", self.len(), self.stage_name(), path);
        Ok(path)
    }

    /// Read a record written by [`StageRecord::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open stage record: {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse stage record: {:?}", path))
    }

    /// Caption units carried by a text stage
    pub fn into_units(self) -> Result<Vec<CaptionUnit>> {
        match self {
            Self::Captions(units) | Self::Merged(units) | Self::Translated(units) => Ok(units),
            Self::Synthesized(_) => Err(anyhow!("A synthesized record holds clips, not caption units")),
        }
    }

    /// Clips carried by the synthesis stage
    pub fn into_clips(self) -> Result<Vec<SynthesizedClip>> {
        match self {
            Self::Synthesized(clips) => Ok(clips),
            other => Err(anyhow!("A {} record holds caption units, not clips", other.stage_name())),
        }
    }
}
