//src/aggregate.rs
//! Turns flat per-set rows into the nested exercise view.
use std::collections::HashMap;

use crate::model::{ExerciseGroup, FlatExerciseRow, SetEntry};

/// Groups rows by exercise type.
///
/// Groups appear in the order their type was first encountered and sets are
/// appended in visiting order, never re-sorted by set number. Nothing is
/// rejected: a row with an empty type lands in an empty-string group and
/// duplicate set numbers are kept as read.
#[must_use]
pub fn group(rows: &[FlatExerciseRow]) -> Vec<ExerciseGroup> {
    let mut groups: Vec<ExerciseGroup> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let idx = *positions
            .entry(row.exercise_type.as_str())
            .or_insert_with(|| {
                groups.push(ExerciseGroup::new(row.exercise_type.clone()));
                groups.len() - 1
            });
        groups[idx].sets.push(SetEntry::from(row));
    }

    groups
}

/// Splits a mixed row sequence by workout and groups each workout's rows.
/// Per-workout row order is the order rows appear in the input.
#[must_use]
pub fn group_by_workout(rows: &[FlatExerciseRow]) -> HashMap<i64, Vec<ExerciseGroup>> {
    let mut per_workout: HashMap<i64, Vec<FlatExerciseRow>> = HashMap::new();
    for row in rows {
        per_workout
            .entry(row.workout_id)
            .or_default()
            .push(row.clone());
    }
    per_workout
        .into_iter()
        .map(|(id, rows)| (id, group(&rows)))
        .collect()
}
