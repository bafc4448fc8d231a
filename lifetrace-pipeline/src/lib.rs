//! LifeTrace Extraction Pipeline
//!
//! Turns raw article text into a [`BiographyResult`] using one of four
//! extraction strategies:
//!
//! | Strategy | Upstream calls | Notes |
//! |----------|----------------|-------|
//! | serial-per-place | 1 + distinct places | coordinates resolved one place at a time |
//! | single-shot | 1 | trajectory and coordinates in one response |
//! | concurrent-chunked | one per paragraph chunk | fan-out, merge, dedup |
//! | semantic-map-reduce | one per chunk + 1 | falls back to concurrent-chunked on failure |
//!
//! Every strategy ends in the same normalization step: points are
//! deduplicated by `(time, location)` and malformed model output becomes the
//! empty result instead of an error.
//!
//! [`ExtractionPipeline::locate`] fills in coordinates the chosen strategy
//! did not provide, with one batch call.

mod merge;
mod parse;
mod pipeline;
pub mod prompts;
mod segment;

pub use merge::{dedup_points, merge_results};
pub use parse::{
    parse_biography, parse_coordinates, parse_locations, strip_code_fence, ParsedBiography,
};
pub use pipeline::ExtractionPipeline;
pub use segment::{points_per_chunk, split_paragraphs, RecursiveSplitter, DEFAULT_SEPARATORS};

pub use lifetrace_core::{BiographyResult, Document, ExtractionStrategy, TrajectoryPoint};
