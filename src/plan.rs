//src/plan.rs
//! Generated-plan ingestion: prompt, sanitize, parse, validate.
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::generator::Generator;
use crate::model::{ExerciseGroup, SetEntry, WorkoutRecord};

const NOT_JSON: &str = "not valid JSON";
const UNEXPECTED_SHAPE: &str = "unexpected shape";

/// What the prompt carries per past workout. Ids and owner stay out.
#[derive(Serialize)]
struct HistoryEntry<'a> {
    name: &'a str,
    date: DateTime<Utc>,
    exercises: &'a [ExerciseGroup],
}

fn serialize_history(history: &[WorkoutRecord]) -> String {
    let entries: Vec<HistoryEntry<'_>> = history
        .iter()
        .map(|w| HistoryEntry {
            name: &w.name,
            date: w.date,
            exercises: &w.exercises,
        })
        .collect();
    // Serializing plain structs of strings and numbers cannot fail.
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}

fn or_none(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("None")
}

/// Builds the generation prompt from history and the optional focus/preferences.
#[must_use]
pub fn build_prompt(history: &[WorkoutRecord], focus: Option<&str>, preferences: Option<&str>) -> String {
    format!(
        "Generate a full workout for the following user based on their workout history, workout focus, and exercise preferences:

- Workout Focus: {focus}
- Exercise Preferences: {preferences}
- Workout History: {history}

Requirements:
1. Include at least four exercises, even if no exercise preferences are provided.
2. For each exercise, aim for slight progression compared to the user's workout history (e.g., increased weight, reps, or duration where appropriate).
3. If no workout history is available, generate a balanced workout suitable for a general fitness goal.

Respond **only** with valid JSON in the following format:
[
    {{
        \"type\": \"string\",
        \"sets\": [
            {{
                \"set_number\": \"number\",
                \"reps\": \"number\",
                \"weight\": \"number\",
                \"duration\": \"number|null\"
            }}
        ]
    }}
]
",
        focus = or_none(focus),
        preferences = or_none(preferences),
        history = serialize_history(history),
    )
}

/// Strips surrounding whitespace and a leading/trailing triple-backtick fence
/// (with or without a `json` tag).
#[must_use]
pub fn sanitize(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn shape_error(detail: impl std::fmt::Display) -> Error {
    Error::validation(format!("{UNEXPECTED_SHAPE}: {detail}"))
}

fn optional_field<'a>(set: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    set.get(key).filter(|v| !v.is_null())
}

fn non_negative_number(value: &Value, field: &str) -> Result<f64, Error> {
    value
        .as_f64()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| shape_error(format!("{field} must be a non-negative number")))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_count(value: &Value, field: &str) -> Result<u32, Error> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| shape_error(format!("{field} is too large")));
    }
    // Accept integral floats such as `8.0`.
    let n = non_negative_number(value, field)?;
    if n.fract() != 0.0 || n > f64::from(u32::MAX) {
        return Err(shape_error(format!("{field} must be a whole number")));
    }
    Ok(n as u32)
}

fn promote_set(value: &Value, position: usize) -> Result<SetEntry, Error> {
    let set = value
        .as_object()
        .ok_or_else(|| shape_error("set is not an object"))?;

    let set_number = match optional_field(set, "set_number") {
        Some(v) => whole_count(v, "set_number")?,
        None => u32::try_from(position + 1).map_err(|_| shape_error("too many sets"))?,
    };
    if set_number == 0 {
        return Err(shape_error("set_number must be positive"));
    }

    Ok(SetEntry {
        set_number,
        reps: optional_field(set, "reps")
            .map(|v| whole_count(v, "reps"))
            .transpose()?,
        weight: optional_field(set, "weight")
            .map(|v| non_negative_number(v, "weight"))
            .transpose()?,
        duration: optional_field(set, "duration")
            .map(|v| non_negative_number(v, "duration"))
            .transpose()?,
    })
}

fn promote_group(value: &Value) -> Result<ExerciseGroup, Error> {
    let group = value
        .as_object()
        .ok_or_else(|| shape_error("exercise is not an object"))?;
    let exercise_type = group
        .get("type")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| shape_error("exercise type missing or empty"))?;
    let sets = group
        .get("sets")
        .and_then(Value::as_array)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| shape_error(format!("{exercise_type} has no sets")))?;

    let sets = sets
        .iter()
        .enumerate()
        .map(|(i, s)| promote_set(s, i))
        .collect::<Result<Vec<_>, _>>()?;
    let group = ExerciseGroup {
        exercise_type: exercise_type.to_string(),
        sets,
    };
    if let Some(n) = group.duplicate_set_number() {
        return Err(shape_error(format!(
            "duplicate set number {n} in {}",
            group.exercise_type
        )));
    }
    Ok(group)
}

/// Parses sanitized text and promotes it into validated exercise groups.
pub fn parse_plan(text: &str) -> Result<Vec<ExerciseGroup>, Error> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        debug!(error = %e, "generated plan is not JSON");
        Error::validation(NOT_JSON)
    })?;
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| shape_error("expected a non-empty array of exercises"))?;
    let groups = items
        .iter()
        .map(promote_group)
        .collect::<Result<Vec<_>, _>>()?;
    for (index, group) in groups.iter().enumerate() {
        if groups[..index]
            .iter()
            .any(|g| g.exercise_type == group.exercise_type)
        {
            return Err(shape_error(format!(
                "exercise type {} appears more than once",
                group.exercise_type
            )));
        }
    }
    Ok(groups)
}

/// Runs the whole pipeline: prompt, generate, sanitize, parse, validate.
/// The result only ever seeds a draft.
pub fn ingest_plan(
    generator: &dyn Generator,
    history: &[WorkoutRecord],
    focus: Option<&str>,
    preferences: Option<&str>,
) -> Result<Vec<ExerciseGroup>, Error> {
    let prompt = build_prompt(history, focus, preferences);
    info!(
        history_workouts = history.len(),
        prompt_len = prompt.len(),
        "generating workout plan"
    );
    let raw = generator.generate(&prompt)?;
    let plan = parse_plan(sanitize(&raw)).inspect_err(|e| {
        warn!(error = %e, "rejected generated plan");
    })?;
    info!(exercises = plan.len(), "accepted generated plan");
    Ok(plan)
}
