//! Prompt templates for each extraction step.
//!
//! Every trajectory prompt asks for the same JSON shape:
//!
//! ```json
//! {"life_trajectory": {"person_name": "...", "trajectory": [
//!     {"time": "...", "location": "...", "description": "...",
//!      "coordinates": {"longitude": 0.0, "latitude": 0.0}}
//! ]}}
//! ```
//!
//! `coordinates` is only requested by the single-shot and reduce prompts.

use lifetrace_core::ModelRequest;

pub const TRAJECTORY_SYSTEM_PROMPT: &str = "\
You extract the life trajectory of a historical figure from biographical text.
Return only JSON of the form
{\"life_trajectory\": {\"person_name\": string, \"trajectory\": [{\"time\": string, \"location\": string, \"description\": string}]}}.
List places in chronological order. Use the modern name of each place where one exists.
Use a year or year range for time. Keep each description under 30 words.
Do not invent events that are not supported by the text.";

pub const COMBINED_SYSTEM_PROMPT: &str = "\
You extract the life trajectory of a historical figure from biographical text and locate every place on a map.
Return only JSON of the form
{\"life_trajectory\": {\"person_name\": string, \"trajectory\": [{\"time\": string, \"location\": string, \"description\": string, \"coordinates\": {\"longitude\": number, \"latitude\": number}}]}}.
List places in chronological order. Use the modern name of each place where one exists.
Coordinates are WGS84 decimal degrees of the place's present-day location.";

pub const COORDINATES_SYSTEM_PROMPT: &str = "\
You are a geocoder for historical and modern place names.
Return only JSON of the form {\"longitude\": number, \"latitude\": number} in WGS84 decimal degrees.
For historical names use the present-day location of the same place.";

pub const LOCATE_SYSTEM_PROMPT: &str = "\
You are a geocoder for historical and modern place names.
Return only JSON of the form
{\"locations\": [{\"name\": string, \"longitude\": number, \"latitude\": number}]}
with one entry per requested place, using the place name exactly as given.
For historical names use the present-day location of the same place. Omit places you cannot locate.";

pub const CHUNK_SYSTEM_PROMPT: &str = "\
You extract life trajectory events from one excerpt of a longer biography.
Return only JSON of the form
{\"life_trajectory\": {\"person_name\": string, \"trajectory\": [{\"time\": string, \"location\": string, \"description\": string}]}}.
Only report events that this excerpt describes. If the excerpt names no places, return an empty trajectory.";

pub const MAP_SYSTEM_PROMPT: &str = "\
You extract life trajectory events from one section of a biography as part of a map-reduce job.
Return only JSON of the form
{\"life_trajectory\": {\"person_name\": string, \"trajectory\": [{\"time\": string, \"location\": string, \"description\": string}]}}.
Report only what this section supports, in chronological order.";

pub const REDUCE_SYSTEM_PROMPT: &str = "\
You merge partial life trajectories of one historical figure into a single coherent trajectory.
Remove duplicates, resolve conflicting dates in favor of the more specific one, order events chronologically, and add coordinates for every place.
Return only JSON of the form
{\"life_trajectory\": {\"person_name\": string, \"trajectory\": [{\"time\": string, \"location\": string, \"description\": string, \"coordinates\": {\"longitude\": number, \"latitude\": number}}]}}.";

/// Whole-article trajectory without coordinates.
pub fn trajectory_request(text: &str) -> ModelRequest {
    ModelRequest::new(format!(
        "Analyze the following biography and extract the life trajectory:\n\n{text}"
    ))
    .with_system_prompt(TRAJECTORY_SYSTEM_PROMPT)
}

/// Whole-article trajectory with coordinates in one response.
pub fn combined_request(text: &str) -> ModelRequest {
    ModelRequest::new(format!(
        "Analyze the following biography, extract the life trajectory and give coordinates for each place:\n\n{text}"
    ))
    .with_system_prompt(COMBINED_SYSTEM_PROMPT)
}

/// Coordinates of one place.
pub fn coordinates_request(place: &str) -> ModelRequest {
    ModelRequest::new(format!("Give the coordinates of: {place}"))
        .with_system_prompt(COORDINATES_SYSTEM_PROMPT)
}

/// Coordinates of several places in one response.
pub fn locate_request(places: &[String]) -> ModelRequest {
    ModelRequest::new(format!(
        "Give the coordinates of each of these places:\n{}",
        places.join("\n")
    ))
    .with_system_prompt(LOCATE_SYSTEM_PROMPT)
}

/// One paragraph chunk, capped at `max_points` events.
pub fn chunk_request(text: &str, max_points: usize) -> ModelRequest {
    ModelRequest::new(format!(
        "Extract at most {max_points} trajectory events from this excerpt:\n\n{text}"
    ))
    .with_system_prompt(CHUNK_SYSTEM_PROMPT)
}

/// Map step over one semantic chunk.
pub fn map_request(text: &str, max_points: usize) -> ModelRequest {
    ModelRequest::new(format!(
        "Extract at most {max_points} trajectory events from this section:\n\n{text}"
    ))
    .with_system_prompt(MAP_SYSTEM_PROMPT)
}

/// Reduce step over the concatenated map outputs.
pub fn reduce_request(partials: &str) -> ModelRequest {
    ModelRequest::new(format!(
        "Merge these partial trajectories into one:\n\n{partials}"
    ))
    .with_system_prompt(REDUCE_SYSTEM_PROMPT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_request_carries_cap_and_text() {
        let request = chunk_request("Su Shi moved to Hangzhou.", 8);
        assert!(request.prompt.contains("at most 8"));
        assert!(request.prompt.ends_with("Su Shi moved to Hangzhou."));
        assert_eq!(request.system_prompt.as_deref(), Some(CHUNK_SYSTEM_PROMPT));
    }

    #[test]
    fn test_locate_request_lists_places() {
        let request = locate_request(&["Meishan".to_string(), "Hangzhou".to_string()]);
        assert!(request.prompt.ends_with("\nMeishan\nHangzhou"));
        assert_eq!(request.system_prompt.as_deref(), Some(LOCATE_SYSTEM_PROMPT));
    }

    #[test]
    fn test_each_step_has_distinct_system_prompt() {
        let prompts = [
            trajectory_request("t").system_prompt,
            combined_request("t").system_prompt,
            coordinates_request("t").system_prompt,
            locate_request(&["t".to_string()]).system_prompt,
            chunk_request("t", 1).system_prompt,
            map_request("t", 1).system_prompt,
            reduce_request("t").system_prompt,
        ];
        for (i, a) in prompts.iter().enumerate() {
            for b in prompts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
