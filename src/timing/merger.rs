use log::debug;

use crate::app_config::TimingConfig;
use crate::caption::CaptionUnit;

// @module: Caption fragment consolidation

/// Groups adjacent caption fragments that belong to one utterance.
///
/// A fragment joins the open group when the previous fragment does not end a
/// sentence, when it does not start with a capital letter, or when the pause
/// before it is shorter than the gap threshold. The duration cap overrides all
/// of these: a fragment whose end would push the group past
/// `max_group_duration` always opens a new group.
#[derive(Debug, Clone)]
pub struct SegmentMerger {
    // @field: Pauses shorter than this never separate utterances (seconds)
    gap_threshold: f64,
    // @field: Longest span a merged group may cover (seconds)
    max_group_duration: f64,
}

impl SegmentMerger {
    pub fn new(config: &TimingConfig) -> Self {
        Self::with_limits(config.merge_gap_threshold, config.max_group_duration)
    }

    pub fn with_limits(gap_threshold: f64, max_group_duration: f64) -> Self {
        Self {
            gap_threshold,
            max_group_duration,
        }
    }

    /// Merge an ordered sequence of units, reindexing the result from 1
    pub fn merge(&self, units: &[CaptionUnit]) -> Vec<CaptionUnit> {
        let Some((first, rest)) = units.split_first() else {
            return Vec::new();
        };

        let mut merged = Vec::new();
        let mut group: Vec<&CaptionUnit> = vec![first];
        let mut prev = first;

        for current in rest {
            let gap = current.start - prev.end;
            let by_content = !ends_sentence(&prev.text)
                || !starts_capitalized(&current.text)
                || gap < self.gap_threshold;
            let group_start = group[0].start;
            let within_cap = current.end - group_start <= self.max_group_duration;

            if by_content && within_cap {
                group.push(current);
            } else {
                merged.push(flush(&group));
                group = vec![current];
            }
            prev = current;
        }
        merged.push(flush(&group));

        for (i, unit) in merged.iter_mut().enumerate() {
            unit.index = i + 1;
        }

        debug!("Merged {} caption fragments into {} units", units.len(), merged.len());
        merged
    }
}

/// Trimmed text ends with `.`, `!` or `?`
pub fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?'])
}

/// Trimmed text starts with an uppercase letter
pub fn starts_capitalized(text: &str) -> bool {
    text.trim_start().chars().next().is_some_and(char::is_uppercase)
}

fn flush(group: &[&CaptionUnit]) -> CaptionUnit {
    let text = join_texts(group.iter().map(|u| u.text.as_str()));

    let original_text = group
        .iter()
        .any(|u| u.original_text.is_some())
        .then(|| join_texts(group.iter().map(|u| u.original_text.as_deref().unwrap_or(&u.text))));

    CaptionUnit {
        index: group[0].index,
        start: group[0].start,
        end: group[group.len() - 1].end,
        text,
        original_text,
    }
}

fn join_texts<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
