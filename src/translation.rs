use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::app_config::Config;
use crate::caption::CaptionUnit;
use crate::diagnostics::{DiagnosticsSink, Stage};
use crate::errors::DubError;
use crate::providers::Translator;

// @module: Caption translation stage

/// Upper bound on entries sent in one request
pub const MAX_ENTRIES_PER_REQUEST: usize = 40;

/// Translates caption units in batches, keeping timing and order intact
pub struct TranslationStage {
    translator: Arc<dyn Translator>,
    source_language: String,
    target_language: String,
    // @field: Character budget of one request
    max_chars_per_request: usize,
    // @field: Requests in flight
    concurrent_requests: usize,
}

impl TranslationStage {
    pub fn new(translator: Arc<dyn Translator>, source_language: &str, target_language: &str) -> Self {
        Self {
            translator,
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            max_chars_per_request: 1000,
            concurrent_requests: 4,
        }
    }

    pub fn from_config(translator: Arc<dyn Translator>, config: &Config) -> Self {
        Self::new(translator, &config.source_language, &config.target_language)
            .with_limits(
                config.translation.get_max_chars_per_request(),
                config.translation.optimal_concurrent_requests(),
            )
    }

    pub fn with_limits(mut self, max_chars_per_request: usize, concurrent_requests: usize) -> Self {
        self.max_chars_per_request = max_chars_per_request.max(1);
        self.concurrent_requests = concurrent_requests.max(1);
        self
    }

    /// Translate every unit.
    ///
    /// A failed batch is retried one unit at a time; a unit that still fails
    /// keeps its source text and is reported to the sink. When no unit gets
    /// translated at all the stage fails with `EmptyStage`.
    pub async fn translate(
        &self,
        units: &[CaptionUnit],
        sink: &dyn DiagnosticsSink,
    ) -> Result<Vec<CaptionUnit>, DubError> {
        if units.is_empty() {
            return Err(DubError::EmptyStage(Stage::Translate.to_string()));
        }

        let chunks = chunk_units(units, self.max_chars_per_request, MAX_ENTRIES_PER_REQUEST);
        info!(
            "Translating {} units in {} requests with {}",
            units.len(),
            chunks.len(),
            self.translator.name()
        );

        let mut results = stream::iter(chunks.into_iter().enumerate())
            .map(|(chunk_index, chunk)| async move {
                let translated = self.translate_chunk(chunk, sink).await;
                (chunk_index, translated)
            })
            .buffer_unordered(self.concurrent_requests)
            .collect::<Vec<_>>()
            .await;

        results.sort_by_key(|(chunk_index, _)| *chunk_index);
        let failed: usize = results.iter().map(|(_, (_, failed))| failed).sum();
        if failed == units.len() {
            warn!("None of the {} units could be translated", units.len());
            return Err(DubError::EmptyStage(Stage::Translate.to_string()));
        }
        if failed > 0 {
            warn!("{} of {} units kept their source text", failed, units.len());
        }

        Ok(results.into_iter().flat_map(|(_, (units, _))| units).collect())
    }

    // @returns: Translated units and how many of them kept their source text
    async fn translate_chunk(&self, chunk: &[CaptionUnit], sink: &dyn DiagnosticsSink) -> (Vec<CaptionUnit>, usize) {
        let texts: Vec<String> = chunk.iter().map(|unit| unit.text.clone()).collect();

        match self.translator
            .translate_batch(&texts, &self.source_language, &self.target_language)
            .await
        {
            Ok(lines) if lines.len() == chunk.len() => {
                return (chunk.iter().zip(lines).map(|(unit, line)| unit.translated(line)).collect(), 0);
            }
            Ok(lines) => warn!(
                "Batch of {} units came back with {} lines, retrying one by one",
                chunk.len(),
                lines.len()
            ),
            Err(e) => warn!("Batch of {} units failed ({}), retrying one by one", chunk.len(), e),
        }

        let mut translated = Vec::with_capacity(chunk.len());
        let mut failed = 0;
        for unit in chunk {
            match self.translate_single(unit, sink).await {
                Some(unit) => translated.push(unit),
                None => {
                    failed += 1;
                    translated.push(unit.translated(unit.text.clone()));
                }
            }
        }
        (translated, failed)
    }

    // @returns: None when the unit has to fall back to its source text
    async fn translate_single(&self, unit: &CaptionUnit, sink: &dyn DiagnosticsSink) -> Option<CaptionUnit> {
        let texts = [unit.text.clone()];
        let result = self.translator
            .translate_batch(&texts, &self.source_language, &self.target_language)
            .await;

        match result {
            Ok(mut lines) if lines.len() == 1 => Some(unit.translated(lines.remove(0))),
            Ok(lines) => {
                sink.report(Stage::Translate, DubError::TranslationFailure {
                    index: unit.index,
                    message: format!("expected 1 line, got {}", lines.len()),
                });
                None
            }
            Err(e) => {
                sink.report(Stage::Translate, DubError::TranslationFailure {
                    index: unit.index,
                    message: e.to_string(),
                });
                None
            }
        }
    }
}

/// Split units into consecutive chunks bounded by characters and entry count.
///
/// A unit longer than the character budget gets a chunk of its own.
pub fn chunk_units(units: &[CaptionUnit], max_chars: usize, max_entries: usize) -> Vec<&[CaptionUnit]> {
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut chars = 0;

    for (i, unit) in units.iter().enumerate() {
        let len = unit.text.chars().count();
        let count = i - chunk_start;
        if count > 0 && (chars + len > max_chars || count >= max_entries) {
            chunks.push(&units[chunk_start..i]);
            chunk_start = i;
            chars = 0;
        }
        chars += len;
    }
    if chunk_start < units.len() {
        chunks.push(&units[chunk_start..]);
    }

    debug!("Split {} units into {} chunks", units.len(), chunks.len());
    chunks
}
