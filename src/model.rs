//src/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The numeric fields of a set. Doubles as the chart metric selector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Metric {
    Reps,
    Weight,
    Duration,
}

/// One performed (or planned) set within an exercise group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub set_number: u32,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub duration: Option<f64>,
}

impl SetEntry {
    #[must_use]
    pub const fn new(set_number: u32) -> Self {
        Self {
            set_number,
            reps: None,
            weight: None,
            duration: None,
        }
    }

    /// Reads a field as a plain number, `None` when it was never recorded.
    #[must_use]
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Reps => self.reps.map(f64::from),
            Metric::Weight => self.weight,
            Metric::Duration => self.duration,
        }
    }

    /// Replaces exactly one field. Reps are truncated to a whole count, callers
    /// are expected to hand in integral values for them.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn set_value(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Reps => self.reps = value.map(|v| v as u32),
            Metric::Weight => self.weight = value,
            Metric::Duration => self.duration = value,
        }
    }
}

/// All sets sharing one exercise name within a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseGroup {
    #[serde(rename = "type")]
    pub exercise_type: String,
    pub sets: Vec<SetEntry>,
}

impl ExerciseGroup {
    pub fn new(exercise_type: impl Into<String>) -> Self {
        Self {
            exercise_type: exercise_type.into(),
            sets: Vec::new(),
        }
    }

    /// Highest set number in the group, 0 for an empty group.
    #[must_use]
    pub fn max_set_number(&self) -> u32 {
        self.sets.iter().map(|s| s.set_number).max().unwrap_or(0)
    }

    /// First set number that occurs more than once, if any.
    #[must_use]
    pub fn duplicate_set_number(&self) -> Option<u32> {
        let mut seen = std::collections::HashSet::new();
        self.sets
            .iter()
            .map(|s| s.set_number)
            .find(|n| !seen.insert(*n))
    }
}

/// A row of the `workouts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRow {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub date: DateTime<Utc>,
}

/// A workout together with its derived nested exercise view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub id: Option<i64>,
    pub owner_id: String,
    pub name: String,
    pub date: DateTime<Utc>,
    pub exercises: Vec<ExerciseGroup>,
}

impl WorkoutRecord {
    #[must_use]
    pub fn from_row(row: WorkoutRow, exercises: Vec<ExerciseGroup>) -> Self {
        Self {
            id: Some(row.id),
            owner_id: row.owner_id,
            name: row.name,
            date: row.date,
            exercises,
        }
    }

    #[must_use]
    pub fn total_sets(&self) -> usize {
        self.exercises.iter().map(|g| g.sets.len()).sum()
    }
}

/// The persisted unit: one row per individual set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatExerciseRow {
    pub workout_id: i64,
    #[serde(rename = "type")]
    pub exercise_type: String,
    pub set_number: u32,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub duration: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<&FlatExerciseRow> for SetEntry {
    fn from(row: &FlatExerciseRow) -> Self {
        Self {
            set_number: row.set_number,
            reps: row.reps,
            weight: row.weight,
            duration: row.duration,
        }
    }
}

/// Flattens nested groups into storage rows tagged with `workout_id`.
/// Set numbers are carried verbatim and group/set order is preserved.
#[must_use]
pub fn flatten_groups(
    groups: &[ExerciseGroup],
    workout_id: i64,
    created_at: DateTime<Utc>,
) -> Vec<FlatExerciseRow> {
    groups
        .iter()
        .flat_map(|group| {
            group.sets.iter().map(move |set| FlatExerciseRow {
                workout_id,
                exercise_type: group.exercise_type.clone(),
                set_number: set.set_number,
                reps: set.reps,
                weight: set.weight,
                duration: set.duration,
                created_at,
            })
        })
        .collect()
}
