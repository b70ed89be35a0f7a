/*!
 * Timecode parsing and formatting.
 *
 * Caption files and stage records carry timestamps as `HH:MM:SS.mmm` text
 * (WebVTT) or `HH:MM:SS,mmm` text (SRT). Everything past the parser works on
 * `f64` seconds.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::DubError;

// @const: One timecode component, digits with an optional fraction
static COMPONENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+(\.\d*)?$").expect("component regex is valid")
});

/// Parse `HH:MM:SS.mmm`, `MM:SS.mmm` or a bare number of seconds.
///
/// Either `.` or `,` is accepted as the fractional separator and surrounding
/// whitespace is ignored.
pub fn parse(text: &str) -> Result<f64, DubError> {
    let malformed = || DubError::MalformedTimecode(text.to_string());

    let normalized = text.trim().replace(',', ".");
    if normalized.is_empty() {
        return Err(malformed());
    }

    let parts: Vec<&str> = normalized.split(':').collect();
    if parts.len() > 3 {
        return Err(malformed());
    }

    let mut values = Vec::with_capacity(parts.len());
    for part in &parts {
        if !COMPONENT_REGEX.is_match(part) {
            return Err(malformed());
        }
        let value: f64 = part.parse().map_err(|_| malformed())?;
        values.push(value);
    }

    let seconds = match values.as_slice() {
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        [m, s] => m * 60.0 + s,
        [s] => *s,
        _ => return Err(malformed()),
    };

    if !seconds.is_finite() {
        return Err(malformed());
    }
    Ok(seconds)
}

/// Canonical `HH:MM:SS.mmm`, rounded to the millisecond, negatives clamped to zero
pub fn format(seconds: f64) -> String {
    format_with(seconds, '.')
}

/// Same as [`format`] with the SRT `,` separator
pub fn format_srt(seconds: f64) -> String {
    format_with(seconds, ',')
}

/// Whole milliseconds for a position in seconds
pub fn to_millis(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).round() as u64
}

fn format_with(seconds: f64, separator: char) -> String {
    let ms = to_millis(seconds);
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, secs, separator, millis)
}

/// Serde adapter storing seconds as SRT-style timecode text.
///
/// Deserialization accepts any parseable timecode string as well as a plain
/// number of seconds.
pub mod text {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(f64),
    }

    pub fn serialize<S>(seconds: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_srt(*seconds))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => super::parse(&text).map_err(serde::de::Error::custom),
            Raw::Seconds(seconds) => Ok(seconds),
        }
    }
}
