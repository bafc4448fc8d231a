//! Strategy dispatch.

use std::sync::Arc;
use std::time::Instant;

use lifetrace_core::{
    BiographyResult, Coordinates, ExtractionError, ExtractionStrategy, LanguageModel,
    LifetraceError, LifetraceResult, PipelineSettings,
};
use lifetrace_llm::invoke_many;

use crate::merge::{dedup_points, merge_results};
use crate::parse::{parse_biography, parse_coordinates, parse_locations, ParsedBiography};
use crate::prompts;
use crate::segment::{points_per_chunk, split_paragraphs, RecursiveSplitter};

/// Extracts a [`BiographyResult`] from article text with a chosen strategy.
///
/// Cheap to share: hold it in an `Arc` and call [`extract`](Self::extract)
/// from any number of tasks.
pub struct ExtractionPipeline {
    model: Arc<dyn LanguageModel>,
    settings: PipelineSettings,
    splitter: RecursiveSplitter,
}

impl ExtractionPipeline {
    pub fn new(model: Arc<dyn LanguageModel>, settings: PipelineSettings) -> LifetraceResult<Self> {
        settings.validate()?;
        let splitter = RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap);
        Ok(Self {
            model,
            settings,
            splitter,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn default_strategy(&self) -> ExtractionStrategy {
        self.settings.default_strategy
    }

    /// Run `strategy` over `text`.
    ///
    /// Fails when the text is blank, or when no upstream call returned a
    /// parseable trajectory. Semantic map-reduce falls back to
    /// concurrent-chunked before giving up.
    pub async fn extract(
        &self,
        text: &str,
        strategy: ExtractionStrategy,
    ) -> LifetraceResult<BiographyResult> {
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyInput.into());
        }

        let start = Instant::now();
        let result = match strategy {
            ExtractionStrategy::SerialPerPlace => self.serial_per_place(text).await,
            ExtractionStrategy::SingleShot => self.single_shot(text).await,
            ExtractionStrategy::ConcurrentChunked => self.concurrent_chunked(text).await,
            ExtractionStrategy::SemanticMapReduce => self.semantic_map_reduce(text).await,
        }?;

        tracing::info!(
            strategy = %strategy,
            points = result.trajectory.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction finished"
        );
        Ok(result)
    }

    /// Resolve coordinates for points that have none, with one batch call.
    ///
    /// Best effort: a failed or unparsable response leaves the result as it
    /// was.
    pub async fn locate(&self, mut result: BiographyResult) -> BiographyResult {
        let mut missing: Vec<String> = Vec::new();
        for point in result.trajectory.iter().filter(|p| p.coordinates.is_none()) {
            if !missing.contains(&point.location) {
                missing.push(point.location.clone());
            }
        }
        if missing.is_empty() {
            return result;
        }

        let raw = match self.model.invoke(&prompts::locate_request(&missing)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(places = missing.len(), error = %e, "Batch location lookup failed");
                return result;
            }
        };
        let located = parse_locations(&raw);

        let mut unresolved = 0usize;
        for point in result.trajectory.iter_mut().filter(|p| p.coordinates.is_none()) {
            match located.iter().find(|(name, _)| *name == point.location) {
                Some((_, coordinates)) => point.coordinates = Some(*coordinates),
                None => unresolved += 1,
            }
        }
        if unresolved > 0 {
            tracing::debug!(unresolved, "Some points have no coordinates");
        }
        result
    }

    // ------------------------------------------------------------------------
    // Single-call strategies
    // ------------------------------------------------------------------------

    /// One trajectory call, then one coordinates call per distinct place.
    async fn serial_per_place(&self, text: &str) -> LifetraceResult<BiographyResult> {
        let raw = self.model.invoke(&prompts::trajectory_request(text)).await?;
        let mut result = structured_or_fail(ExtractionStrategy::SerialPerPlace, &raw)?;

        let mut places: Vec<String> = Vec::new();
        for point in &result.trajectory {
            if !places.contains(&point.location) {
                places.push(point.location.clone());
            }
        }

        let mut resolved: Vec<(String, Coordinates)> = Vec::with_capacity(places.len());
        for place in places {
            match self.model.invoke(&prompts::coordinates_request(&place)).await {
                Ok(raw) => match parse_coordinates(&raw) {
                    Some(coordinates) => resolved.push((place, coordinates)),
                    None => tracing::warn!(place = %place, "No usable coordinates for place"),
                },
                Err(e) => tracing::warn!(place = %place, error = %e, "Coordinate lookup failed"),
            }
        }

        for point in &mut result.trajectory {
            if let Some((_, coordinates)) = resolved.iter().find(|(place, _)| *place == point.location) {
                point.coordinates = Some(*coordinates);
            }
        }
        Ok(result)
    }

    async fn single_shot(&self, text: &str) -> LifetraceResult<BiographyResult> {
        let raw = self.model.invoke(&prompts::combined_request(text)).await?;
        structured_or_fail(ExtractionStrategy::SingleShot, &raw)
    }

    // ------------------------------------------------------------------------
    // Chunked strategies
    // ------------------------------------------------------------------------

    async fn concurrent_chunked(&self, text: &str) -> LifetraceResult<BiographyResult> {
        let chunks = split_paragraphs(text, self.settings.min_paragraph_length);
        if chunks.is_empty() {
            return Err(ExtractionError::EmptyInput.into());
        }
        let cap = self.cap_for(chunks.len());
        tracing::debug!(chunks = chunks.len(), cap, "Dispatching paragraph chunks");

        let requests = chunks
            .iter()
            .map(|chunk| prompts::chunk_request(chunk.content(), cap))
            .collect();
        let outputs = self.fan_out(requests).await?;

        let parsed: Vec<BiographyResult> = outputs
            .iter()
            .filter_map(|raw| match parse_biography(raw) {
                ParsedBiography::Structured(result) => Some(result),
                ParsedBiography::Malformed { .. } => None,
            })
            .collect();
        if parsed.is_empty() {
            return Err(ExtractionError::AllChunksFailed {
                chunk_count: chunks.len(),
            }
            .into());
        }
        if parsed.len() < outputs.len() {
            tracing::debug!(
                usable = parsed.len(),
                returned = outputs.len(),
                "Some chunk outputs were unusable"
            );
        }
        Ok(merge_results(parsed))
    }

    async fn semantic_map_reduce(&self, text: &str) -> LifetraceResult<BiographyResult> {
        match self.map_reduce(text).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(error = %e, "Map-reduce failed, falling back to concurrent-chunked");
                self.concurrent_chunked(text).await
            }
        }
    }

    async fn map_reduce(&self, text: &str) -> LifetraceResult<BiographyResult> {
        let chunks = self
            .splitter
            .split_documents(text, self.settings.min_chunk_length);
        if chunks.is_empty() {
            return Err(strategy_error(
                ExtractionStrategy::SemanticMapReduce,
                "no chunk reached the minimum length",
            ));
        }
        let cap = self.cap_for(chunks.len());
        tracing::debug!(chunks = chunks.len(), cap, "Dispatching map step");

        let requests = chunks
            .iter()
            .map(|chunk| prompts::map_request(chunk.content(), cap))
            .collect();
        let partials = self.fan_out(requests).await?;

        let raw = self
            .model
            .invoke(&prompts::reduce_request(&partials.join("\n\n")))
            .await?;
        structured_or_fail(ExtractionStrategy::SemanticMapReduce, &raw)
    }

    fn cap_for(&self, chunk_count: usize) -> usize {
        points_per_chunk(
            chunk_count,
            self.settings.max_points_per_chunk,
            self.settings.total_points_target,
        )
    }

    /// Dispatch all requests at once and keep the successful outputs in
    /// order. Fails only when every request failed.
    async fn fan_out(
        &self,
        requests: Vec<lifetrace_core::ModelRequest>,
    ) -> LifetraceResult<Vec<String>> {
        let chunk_count = requests.len();
        let outcomes = invoke_many(Arc::clone(&self.model), requests).await;

        let mut outputs = Vec::with_capacity(chunk_count);
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(raw) => outputs.push(raw),
                Err(e) => tracing::warn!(chunk = index, error = %e, "Chunk extraction failed"),
            }
        }

        if outputs.is_empty() {
            return Err(ExtractionError::AllChunksFailed { chunk_count }.into());
        }
        Ok(outputs)
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("model", &self.model.model_id())
            .field("settings", &self.settings)
            .finish()
    }
}

fn normalize(result: BiographyResult) -> BiographyResult {
    BiographyResult::new(result.person_name, dedup_points(result.trajectory))
}

/// The normalized trajectory in `raw`, or a strategy error when the
/// response is not a trajectory at all.
fn structured_or_fail(
    strategy: ExtractionStrategy,
    raw: &str,
) -> LifetraceResult<BiographyResult> {
    match parse_biography(raw) {
        ParsedBiography::Structured(result) => Ok(normalize(result)),
        ParsedBiography::Malformed { reason } => Err(strategy_error(
            strategy,
            &format!("no usable output: {reason}"),
        )),
    }
}

fn strategy_error(strategy: ExtractionStrategy, reason: &str) -> LifetraceError {
    ExtractionError::Strategy {
        strategy: strategy.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
