use anyhow::{Result, Context, anyhow};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::diagnostics::{DiagnosticsSink, Stage};
use crate::errors::DubError;
use crate::file_utils::FileManager;
use crate::timecode;

// @module: Timed caption units, WebVTT/SRT parsing and writing

// @const: Cue timing line, "start --> end [settings]"
static CUE_TIMING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\S+)\s+-->\s+(\S+)").expect("cue timing regex is valid")
});

// @const: Inline markup such as <c>, <i>, </b> or <00:00:01.000>
static INLINE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^>]*>").expect("inline tag regex is valid")
});

// @struct: One timed span of caption text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionUnit {
    // @field: 1-based position, reassigned by every stage that regroups units
    pub index: usize,

    // @field: Start in seconds
    #[serde(with = "crate::timecode::text")]
    pub start: f64,

    // @field: End in seconds
    #[serde(with = "crate::timecode::text")]
    pub end: f64,

    // @field: Text to be spoken
    pub text: String,

    // @field: Source-language text, kept once the unit has been translated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

impl CaptionUnit {
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
            original_text: None,
        }
    }

    // @creates: Unit with a positive window and non-empty trimmed text
    pub fn new_validated(index: usize, start: f64, end: f64, text: &str) -> Result<Self, DubError> {
        if !(end > start) {
            return Err(DubError::TimingInconsistency {
                index,
                message: format!(
                    "end {} is not after start {}",
                    timecode::format(end),
                    timecode::format(start)
                ),
            });
        }

        Ok(Self::new(index, start, end, text.trim()))
    }

    /// Length of the caption window in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Copy of this unit carrying translated text, remembering the source text
    pub fn translated(&self, text: impl Into<String>) -> Self {
        Self {
            index: self.index,
            start: self.start,
            end: self.end,
            text: text.into(),
            original_text: Some(self.original_text.clone().unwrap_or_else(|| self.text.clone())),
        }
    }
}

impl fmt::Display for CaptionUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(f, "{} --> {}", timecode::format_srt(self.start), timecode::format_srt(self.end))?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Caption file flavours understood by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionFormat {
    WebVtt,
    Srt,
}

impl CaptionFormat {
    /// Guess the format from the content first and the extension second
    pub fn detect(path: &Path, content: &str) -> Option<Self> {
        if content.trim_start_matches('\u{feff}').trim_start().starts_with("WEBVTT") {
            return Some(Self::WebVtt);
        }

        match path.extension().map(|ext| ext.to_string_lossy().to_lowercase()).as_deref() {
            Some("vtt") => Some(Self::WebVtt),
            Some("srt") => Some(Self::Srt),
            _ if content.contains("-->") => Some(Self::Srt),
            _ => None,
        }
    }
}

/// Read and parse a caption file, dropping malformed cues into the sink
pub fn parse_captions<P: AsRef<Path>>(path: P, sink: &dyn DiagnosticsSink) -> Result<Vec<CaptionUnit>> {
    let path = path.as_ref();
    let content = FileManager::read_to_string(path)?;

    let parsed = match CaptionFormat::detect(path, &content) {
        Some(CaptionFormat::WebVtt) => parse_vtt(&content, sink),
        Some(CaptionFormat::Srt) => parse_srt(&content, sink),
        None => Err(anyhow!("Unrecognized caption format: {:?}", path)),
    };

    parsed.with_context(|| format!("Failed to parse captions from {:?}", path))
}

/// Parse WebVTT content.
///
/// The header block and NOTE/STYLE/REGION blocks are skipped, cue identifiers
/// and cue settings are ignored, multi-line cue text is joined with a space
/// and inline markup is stripped.
pub fn parse_vtt(content: &str, sink: &dyn DiagnosticsSink) -> Result<Vec<CaptionUnit>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut units = Vec::new();
    let mut cue_number = 0;

    for block in split_blocks(content) {
        let first = block[0].trim();
        if first.starts_with("WEBVTT")
            || first.starts_with("NOTE")
            || first.starts_with("STYLE")
            || first.starts_with("REGION")
        {
            continue;
        }

        let Some(timing_pos) = block.iter().position(|line| line.contains("-->")) else {
            debug!("Skipping VTT block without cue timing: {}", first);
            continue;
        };

        cue_number += 1;
        if let Some(unit) = parse_cue(cue_number, block[timing_pos], &block[timing_pos + 1..], sink) {
            units.push(unit);
        }
    }

    finish(units, "WebVTT")
}

/// Parse SRT content
pub fn parse_srt(content: &str, sink: &dyn DiagnosticsSink) -> Result<Vec<CaptionUnit>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut units = Vec::new();

    for block in split_blocks(content) {
        let Some(timing_pos) = block.iter().position(|line| line.contains("-->")) else {
            warn!("Unexpected text before sequence number or timestamp: {}", block[0].trim());
            continue;
        };

        let seq_num = block[..timing_pos]
            .last()
            .and_then(|line| line.trim().parse::<usize>().ok())
            .unwrap_or(units.len() + 1);

        if let Some(unit) = parse_cue(seq_num, block[timing_pos], &block[timing_pos + 1..], sink) {
            units.push(unit);
        }
    }

    finish(units, "SRT")
}

/// Serialize units as SRT text
pub fn to_srt_string(units: &[CaptionUnit]) -> String {
    units.iter().map(|unit| unit.to_string()).collect()
}

/// Serialize units as WebVTT text
pub fn to_vtt_string(units: &[CaptionUnit]) -> String {
    let mut output = String::from("WEBVTT\n\n");
    for unit in units {
        output.push_str(&format!(
            "{} --> {}\n{}\n\n",
            timecode::format(unit.start),
            timecode::format(unit.end),
            unit.text
        ));
    }
    output
}

/// Write units to an SRT file
pub fn write_srt<P: AsRef<Path>>(units: &[CaptionUnit], path: P) -> Result<()> {
    FileManager::write_to_file(path, &to_srt_string(units))
}

// Blank-line separated blocks of non-empty lines
fn split_blocks(content: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

fn parse_cue(
    index: usize,
    timing_line: &str,
    text_lines: &[&str],
    sink: &dyn DiagnosticsSink,
) -> Option<CaptionUnit> {
    let Some(caps) = CUE_TIMING_REGEX.captures(timing_line) else {
        sink.report(Stage::Captions, DubError::MalformedTimecode(timing_line.trim().to_string()));
        return None;
    };

    let start = match timecode::parse(&caps[1]) {
        Ok(seconds) => seconds,
        Err(e) => {
            sink.report(Stage::Captions, e);
            return None;
        }
    };
    let end = match timecode::parse(&caps[2]) {
        Ok(seconds) => seconds,
        Err(e) => {
            sink.report(Stage::Captions, e);
            return None;
        }
    };

    let text = clean_text(text_lines);
    if text.is_empty() {
        debug!("Skipping empty cue {}", index);
        return None;
    }

    match CaptionUnit::new_validated(index, start, end, &text) {
        Ok(unit) => Some(unit),
        Err(e) => {
            sink.report(Stage::Captions, e);
            None
        }
    }
}

fn clean_text(lines: &[&str]) -> String {
    let joined = lines.join(" ");
    let stripped = INLINE_TAG_REGEX.replace_all(&joined, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn finish(mut units: Vec<CaptionUnit>, format_name: &str) -> Result<Vec<CaptionUnit>> {
    if units.is_empty() {
        return Err(anyhow!("No valid cues were found in the {} content", format_name));
    }

    // Stable, so cues sharing a start keep file order
    units.sort_by(|a, b| a.start.total_cmp(&b.start));

    let overlaps = units.windows(2).filter(|pair| pair[0].end > pair[1].start).count();
    if overlaps > 0 {
        warn!("Found {} overlapping {} cues", overlaps, format_name);
    }

    for (i, unit) in units.iter_mut().enumerate() {
        unit.index = i + 1;
    }

    Ok(units)
}
