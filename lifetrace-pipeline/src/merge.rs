//! Merging and deduplication of partial results.

use std::collections::HashSet;

use lifetrace_core::{BiographyResult, TrajectoryPoint, UNKNOWN_PERSON};

/// Drop repeated `(time, location)` pairs, keeping the first occurrence in
/// its original position.
pub fn dedup_points(points: Vec<TrajectoryPoint>) -> Vec<TrajectoryPoint> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(points.len());
    points
        .into_iter()
        .filter(|point| seen.insert((point.time.clone(), point.location.clone())))
        .collect()
}

/// Combine chunk results in order.
///
/// The first non-empty person name wins, falling back to "Unknown".
/// Trajectories are concatenated and then deduplicated.
pub fn merge_results<I>(results: I) -> BiographyResult
where
    I: IntoIterator<Item = BiographyResult>,
{
    let mut person_name: Option<String> = None;
    let mut points = Vec::new();
    for result in results {
        if person_name.is_none() && !result.person_name.is_empty() {
            person_name = Some(result.person_name);
        }
        points.extend(result.trajectory);
    }
    BiographyResult::new(
        person_name.unwrap_or_else(|| UNKNOWN_PERSON.to_string()),
        dedup_points(points),
    )
}
