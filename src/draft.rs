//src/draft.rs
//! Editable in-memory workout and its two-step save.
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::{Error as DbError, WorkoutStore};
use crate::error::Error;
use crate::model::{flatten_groups, ExerciseGroup, FlatExerciseRow, Metric, SetEntry, WorkoutRecord};

/// Parses user-typed text for one set field.
///
/// Empty, unparseable, negative or non-finite input yields `None`. Reps also
/// yield `None` for non-integral input.
#[must_use]
pub fn parse_raw_value(metric: Metric, raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if metric == Metric::Reps && (value.fract() != 0.0 || value > f64::from(u32::MAX)) {
        return None;
    }
    Some(value)
}

/// Weight and duration must be finite and non-negative when present.
fn check_set_values(
    exercise_type: &str,
    weight: Option<f64>,
    duration: Option<f64>,
) -> Result<(), Error> {
    for (metric, value) in [(Metric::Weight, weight), (Metric::Duration, duration)] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::validation(format!(
                    "{exercise_type} has an invalid {metric}: {v}"
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub name: String,
    pub exercises: Vec<ExerciseGroup>,
}

impl Draft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exercises: Vec::new(),
        }
    }

    /// Seeds a draft from a validated generated plan.
    pub fn from_plan(name: impl Into<String>, plan: Vec<ExerciseGroup>) -> Self {
        Self {
            name: name.into(),
            exercises: plan,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Adds `set_count` sets sharing the given values.
    ///
    /// A type already in the draft gets the sets appended to its group,
    /// numbered on from its highest set. A new type gets a group numbered from 1.
    pub fn add_exercise(
        &mut self,
        exercise_type: &str,
        set_count: u32,
        reps: Option<u32>,
        weight: Option<f64>,
        duration: Option<f64>,
    ) -> Result<&ExerciseGroup, Error> {
        let exercise_type = exercise_type.trim();
        if exercise_type.is_empty() {
            return Err(Error::validation("exercise type cannot be empty"));
        }
        if set_count == 0 {
            return Err(Error::validation("an exercise needs at least one set"));
        }
        check_set_values(exercise_type, weight, duration)?;

        let index = match self
            .exercises
            .iter()
            .position(|g| g.exercise_type == exercise_type)
        {
            Some(index) => index,
            None => {
                self.exercises.push(ExerciseGroup::new(exercise_type));
                self.exercises.len() - 1
            }
        };
        let group = &mut self.exercises[index];
        let first = group.max_set_number() + 1;
        let last = first
            .checked_add(set_count - 1)
            .ok_or_else(|| Error::validation(format!("{exercise_type} has too many sets")))?;
        group.sets.extend((first..=last).map(|set_number| SetEntry {
            set_number,
            reps,
            weight,
            duration,
        }));
        Ok(&self.exercises[index])
    }

    /// Appends a set numbered one past the group's highest set number.
    pub fn add_set(
        &mut self,
        exercise_index: usize,
        reps: Option<u32>,
        weight: Option<f64>,
        duration: Option<f64>,
    ) -> Result<&SetEntry, Error> {
        let group = self
            .exercises
            .get_mut(exercise_index)
            .ok_or(Error::ExerciseIndex(exercise_index))?;
        check_set_values(&group.exercise_type, weight, duration)?;
        let set_number = group.max_set_number() + 1;
        group.sets.push(SetEntry {
            set_number,
            reps,
            weight,
            duration,
        });
        Ok(&group.sets[group.sets.len() - 1])
    }

    /// Replaces exactly one field of one set with the parsed raw value.
    pub fn update_set_value(
        &mut self,
        exercise_index: usize,
        set_index: usize,
        metric: Metric,
        raw: &str,
    ) -> Result<Option<f64>, Error> {
        let set = self
            .exercises
            .get_mut(exercise_index)
            .and_then(|g| g.sets.get_mut(set_index))
            .ok_or(Error::Index {
                exercise_index,
                set_index,
            })?;
        let value = parse_raw_value(metric, raw);
        set.set_value(metric, value);
        Ok(value)
    }

    pub fn remove_exercise(&mut self, exercise_index: usize) -> Result<ExerciseGroup, Error> {
        if exercise_index >= self.exercises.len() {
            return Err(Error::ExerciseIndex(exercise_index));
        }
        Ok(self.exercises.remove(exercise_index))
    }

    #[must_use]
    pub fn total_sets(&self) -> usize {
        self.exercises.iter().map(|g| g.sets.len()).sum()
    }

    #[must_use]
    pub fn flatten(&self, workout_id: i64, created_at: DateTime<Utc>) -> Vec<FlatExerciseRow> {
        flatten_groups(&self.exercises, workout_id, created_at)
    }

    /// Checks everything `save` requires before any store call.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("workout name cannot be empty"));
        }
        if self.exercises.is_empty() {
            return Err(Error::validation("add at least one exercise before saving"));
        }
        for (index, group) in self.exercises.iter().enumerate() {
            if group.exercise_type.trim().is_empty() {
                return Err(Error::validation("exercise type cannot be empty"));
            }
            if group.sets.is_empty() {
                return Err(Error::validation(format!(
                    "{} has no sets",
                    group.exercise_type
                )));
            }
            if group.sets.iter().any(|s| s.set_number == 0) {
                return Err(Error::validation(format!(
                    "{} has a set numbered 0",
                    group.exercise_type
                )));
            }
            if let Some(n) = group.duplicate_set_number() {
                return Err(Error::validation(format!(
                    "{} has set number {n} more than once",
                    group.exercise_type
                )));
            }
            if self.exercises[..index]
                .iter()
                .any(|g| g.exercise_type == group.exercise_type)
            {
                return Err(Error::validation(format!(
                    "{} is listed more than once",
                    group.exercise_type
                )));
            }
            for set in &group.sets {
                check_set_values(&group.exercise_type, set.weight, set.duration)?;
            }
        }
        Ok(())
    }
}

/// Persists a draft in two steps: the workout header, then its flattened rows.
///
/// A failing first step leaves nothing behind and surfaces as `Store`. A
/// failing second step leaves the header orphaned and surfaces as
/// `PartialPersistence` carrying its id.
pub fn save(
    draft: &Draft,
    owner_id: &str,
    store: &mut dyn WorkoutStore,
) -> Result<WorkoutRecord, Error> {
    draft.validate()?;

    let now = Utc::now();
    let workout = store.insert_workout(owner_id, draft.name.trim(), now)?;
    info!(workout_id = workout.id, "saved workout header");

    let rows = draft.flatten(workout.id, now);
    if let Err(source) = store.insert_exercise_rows(&rows) {
        warn!(workout_id = workout.id, error = %source, "exercise rows were not saved");
        return Err(Error::PartialPersistence {
            workout_id: workout.id,
            source,
        });
    }
    info!(workout_id = workout.id, rows = rows.len(), "saved exercise rows");

    Ok(WorkoutRecord::from_row(workout, draft.exercises.clone()))
}

/// Repeats only the second save step for a workout whose header already exists.
///
/// The header must belong to `owner_id`. Rows are stamped with the header date.
pub fn retry_rows(
    draft: &Draft,
    owner_id: &str,
    workout_id: i64,
    store: &mut dyn WorkoutStore,
) -> Result<usize, Error> {
    draft.validate()?;
    let header = store
        .get_workout(owner_id, workout_id)?
        .ok_or(DbError::WorkoutNotFound(workout_id))?;
    let rows = draft.flatten(header.id, header.date);
    let written = store
        .insert_exercise_rows(&rows)
        .map_err(|source| Error::PartialPersistence { workout_id, source })?;
    info!(workout_id, rows = written, "saved exercise rows on retry");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkoutRow;
    use chrono::TimeZone;

    /// Counts calls and fails whichever step it is told to.
    #[derive(Default)]
    struct FakeStore {
        fail_header: bool,
        fail_rows: bool,
        header_calls: usize,
        header: Option<WorkoutRow>,
        row_batches: Vec<Vec<FlatExerciseRow>>,
    }

    impl WorkoutStore for FakeStore {
        fn insert_workout(
            &mut self,
            owner_id: &str,
            name: &str,
            date: DateTime<Utc>,
        ) -> Result<WorkoutRow, DbError> {
            self.header_calls += 1;
            if self.fail_header {
                return Err(DbError::InsertFailed(rusqlite::Error::InvalidQuery));
            }
            let row = WorkoutRow {
                id: 41,
                owner_id: owner_id.into(),
                name: name.into(),
                date,
            };
            self.header = Some(row.clone());
            Ok(row)
        }

        fn insert_exercise_rows(&mut self, rows: &[FlatExerciseRow]) -> Result<usize, DbError> {
            if self.fail_rows {
                return Err(DbError::InsertFailed(rusqlite::Error::InvalidQuery));
            }
            self.row_batches.push(rows.to_vec());
            Ok(rows.len())
        }

        fn list_workouts(&self, _: &str, _: Option<u32>) -> Result<Vec<WorkoutRow>, DbError> {
            Ok(Vec::new())
        }

        fn get_workout(&self, owner_id: &str, id: i64) -> Result<Option<WorkoutRow>, DbError> {
            Ok(self
                .header
                .clone()
                .filter(|w| w.id == id && w.owner_id == owner_id))
        }

        fn list_exercise_rows(&self, _: i64) -> Result<Vec<FlatExerciseRow>, DbError> {
            Ok(Vec::new())
        }

        fn list_exercise_rows_for_owner(&self, _: &str) -> Result<Vec<FlatExerciseRow>, DbError> {
            Ok(Vec::new())
        }

        fn list_rows_for_exercise(&self, _: &str, _: &str) -> Result<Vec<FlatExerciseRow>, DbError> {
            Ok(Vec::new())
        }

        fn exercise_types(&self, _: &str) -> Result<Vec<String>, DbError> {
            Ok(Vec::new())
        }

        fn delete_workout(&mut self, _: &str, id: i64) -> Result<usize, DbError> {
            Err(DbError::WorkoutNotFound(id))
        }
    }

    fn leg_day() -> Draft {
        let mut draft = Draft::new("Leg day");
        draft.add_exercise("Squat", 2, Some(5), Some(100.0), None).unwrap();
        draft
    }

    #[test]
    fn add_exercise_rejects_empty_type_and_zero_sets() {
        let mut draft = Draft::new("x");
        assert!(matches!(
            draft.add_exercise("", 3, None, None, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            draft.add_exercise("   ", 3, None, None, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            draft.add_exercise("Curl", 0, None, None, None),
            Err(Error::Validation(_))
        ));
        assert!(draft.exercises.is_empty());
    }

    #[test]
    fn add_exercise_numbers_sets_from_one() {
        let mut draft = Draft::new("x");
        let group = draft.add_exercise("Curl", 3, None, None, None).unwrap();
        assert_eq!(group.exercise_type, "Curl");
        let numbers: Vec<u32> = group.sets.iter().map(|s| s.set_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(group
            .sets
            .iter()
            .all(|s| s.reps.is_none() && s.weight.is_none() && s.duration.is_none()));
    }

    #[test]
    fn add_exercise_shares_given_values() {
        let draft = leg_day();
        assert!(draft.exercises[0]
            .sets
            .iter()
            .all(|s| s.reps == Some(5) && s.weight == Some(100.0) && s.duration.is_none()));
    }

    #[test]
    fn add_set_continues_after_highest_number() {
        let mut draft = Draft::from_plan(
            "Plan",
            vec![ExerciseGroup {
                exercise_type: "Row".into(),
                sets: vec![SetEntry::new(1), SetEntry::new(4)],
            }],
        );
        let added = draft.add_set(0, Some(10), None, None).unwrap();
        assert_eq!(added.set_number, 5);
        assert!(matches!(
            draft.add_set(3, None, None, None),
            Err(Error::ExerciseIndex(3))
        ));
        assert_eq!(
            Error::ExerciseIndex(3).to_string(),
            "No exercise at position 4"
        );
    }

    #[test]
    fn add_set_rejects_negative_and_non_finite_values() {
        let mut draft = leg_day();
        assert!(matches!(
            draft.add_set(0, Some(5), Some(-2.5), None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            draft.add_set(0, None, None, Some(f64::NAN)),
            Err(Error::Validation(_))
        ));
        assert_eq!(draft.exercises[0].sets.len(), 2);
    }

    #[test]
    fn add_exercise_rejects_negative_and_non_finite_values() {
        let mut draft = Draft::new("x");
        for (weight, duration) in [
            (Some(-5.0), None),
            (Some(f64::NAN), None),
            (None, Some(f64::INFINITY)),
            (None, Some(-1.0)),
        ] {
            assert!(matches!(
                draft.add_exercise("Squat", 1, Some(5), weight, duration),
                Err(Error::Validation(_))
            ));
        }
        assert!(draft.exercises.is_empty());
        assert!(draft.add_exercise("Squat", 1, Some(0), Some(0.0), Some(0.0)).is_ok());
    }

    #[test]
    fn add_exercise_extends_a_group_of_the_same_type() {
        let mut draft = leg_day();
        draft.add_exercise("Bench", 1, Some(8), Some(60.0), None).unwrap();
        let group = draft.add_exercise(" Squat ", 2, Some(3), Some(110.0), None).unwrap();
        let numbers: Vec<u32> = group.sets.iter().map(|s| s.set_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(group.sets[2].weight, Some(110.0));
        assert_eq!(draft.exercises.len(), 2);
        assert_eq!(draft.exercises[1].exercise_type, "Bench");
    }

    #[test]
    fn update_set_value_replaces_one_field() {
        let mut draft = leg_day();
        assert_eq!(draft.update_set_value(0, 1, Metric::Weight, " 107.5 ").unwrap(), Some(107.5));
        let set = &draft.exercises[0].sets[1];
        assert_eq!(set.weight, Some(107.5));
        assert_eq!(set.reps, Some(5));
        assert_eq!(draft.exercises[0].sets[0].weight, Some(100.0));

        assert_eq!(draft.update_set_value(0, 1, Metric::Reps, "").unwrap(), None);
        assert_eq!(draft.exercises[0].sets[1].reps, None);
        assert_eq!(draft.exercises[0].sets[1].weight, Some(107.5));
    }

    #[test]
    fn update_set_value_checks_indices() {
        let mut draft = leg_day();
        assert!(matches!(
            draft.update_set_value(1, 0, Metric::Weight, "1"),
            Err(Error::Index {
                exercise_index: 1,
                set_index: 0
            })
        ));
        assert!(matches!(
            draft.update_set_value(0, 2, Metric::Weight, "1"),
            Err(Error::Index {
                exercise_index: 0,
                set_index: 2
            })
        ));
    }

    #[test]
    fn raw_values_parse_to_number_or_null() {
        assert_eq!(parse_raw_value(Metric::Weight, "62.5"), Some(62.5));
        assert_eq!(parse_raw_value(Metric::Duration, "  3 "), Some(3.0));
        assert_eq!(parse_raw_value(Metric::Reps, "8"), Some(8.0));
        assert_eq!(parse_raw_value(Metric::Reps, "8.5"), None);
        assert_eq!(parse_raw_value(Metric::Weight, ""), None);
        assert_eq!(parse_raw_value(Metric::Weight, "heavy"), None);
        assert_eq!(parse_raw_value(Metric::Weight, "-5"), None);
        assert_eq!(parse_raw_value(Metric::Weight, "NaN"), None);
        assert_eq!(parse_raw_value(Metric::Weight, "inf"), None);
    }

    #[test]
    fn remove_exercise_checks_index() {
        let mut draft = leg_day();
        assert!(matches!(draft.remove_exercise(1), Err(Error::ExerciseIndex(1))));
        assert_eq!(draft.remove_exercise(0).unwrap().exercise_type, "Squat");
        assert!(draft.exercises.is_empty());
    }

    #[test]
    fn save_without_exercises_makes_no_store_call() {
        let mut store = FakeStore::default();
        let draft = Draft::new("Empty");
        assert!(matches!(save(&draft, "u1", &mut store), Err(Error::Validation(_))));
        assert_eq!(store.header_calls, 0);
        assert!(store.row_batches.is_empty());
    }

    #[test]
    fn save_without_name_makes_no_store_call() {
        let mut store = FakeStore::default();
        let mut draft = leg_day();
        draft.rename("  ");
        assert!(matches!(save(&draft, "u1", &mut store), Err(Error::Validation(_))));
        assert_eq!(store.header_calls, 0);
    }

    #[test]
    fn save_rejects_duplicate_set_numbers() {
        let mut store = FakeStore::default();
        let draft = Draft::from_plan(
            "Plan",
            vec![ExerciseGroup {
                exercise_type: "Row".into(),
                sets: vec![SetEntry::new(2), SetEntry::new(2)],
            }],
        );
        assert!(matches!(save(&draft, "u1", &mut store), Err(Error::Validation(_))));
        assert_eq!(store.header_calls, 0);
    }

    #[test]
    fn save_flattens_rows_under_the_new_workout() {
        let mut store = FakeStore::default();
        let mut draft = leg_day();
        draft.add_exercise("Plank", 1, None, None, Some(1.0)).unwrap();
        let record = save(&draft, "u1", &mut store).unwrap();

        assert_eq!(record.id, Some(41));
        assert_eq!(record.owner_id, "u1");
        assert_eq!(record.exercises, draft.exercises);
        let rows = &store.row_batches[0];
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.workout_id == 41 && r.created_at == record.date));
        assert_eq!(rows[2].exercise_type, "Plank");
    }

    #[test]
    fn failing_header_is_a_store_error() {
        let mut store = FakeStore {
            fail_header: true,
            ..Default::default()
        };
        assert!(matches!(save(&leg_day(), "u1", &mut store), Err(Error::Store(_))));
        assert!(store.row_batches.is_empty());
    }

    #[test]
    fn failing_rows_is_a_partial_persistence_error() {
        let mut store = FakeStore {
            fail_rows: true,
            ..Default::default()
        };
        let draft = leg_day();
        assert!(matches!(
            save(&draft, "u1", &mut store),
            Err(Error::PartialPersistence { workout_id: 41, .. })
        ));

        store.fail_rows = false;
        assert_eq!(retry_rows(&draft, "u1", 41, &mut store).unwrap(), 2);
        assert!(store.row_batches[0].iter().all(|r| r.workout_id == 41));
    }

    #[test]
    fn save_rejects_bad_values_before_any_store_call() {
        let mut store = FakeStore::default();
        for weight in [-5.0, f64::NAN] {
            let mut draft = leg_day();
            draft.exercises[0].sets[1].weight = Some(weight);
            assert!(matches!(save(&draft, "u1", &mut store), Err(Error::Validation(_))));
        }
        assert_eq!(store.header_calls, 0);
    }

    #[test]
    fn save_rejects_a_repeated_exercise_type() {
        let mut store = FakeStore::default();
        let squat = ExerciseGroup {
            exercise_type: "Squat".into(),
            sets: vec![SetEntry::new(1), SetEntry::new(2)],
        };
        let bench = ExerciseGroup {
            exercise_type: "Bench".into(),
            sets: vec![SetEntry::new(1)],
        };
        let draft = Draft::from_plan("Plan", vec![squat.clone(), bench, squat]);
        match draft.validate() {
            Err(Error::Validation(msg)) => assert_eq!(msg, "Squat is listed more than once"),
            other => panic!("expected a validation error, got {other:?}"),
        }
        assert!(matches!(save(&draft, "u1", &mut store), Err(Error::Validation(_))));
        assert_eq!(store.header_calls, 0);
    }

    #[test]
    fn retry_stamps_rows_with_the_header_date() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap();
        let mut store = FakeStore {
            header: Some(WorkoutRow {
                id: 41,
                owner_id: "u1".into(),
                name: "Leg day".into(),
                date,
            }),
            ..Default::default()
        };
        assert_eq!(retry_rows(&leg_day(), "u1", 41, &mut store).unwrap(), 2);
        assert!(store.row_batches[0].iter().all(|r| r.created_at == date));
    }

    #[test]
    fn retry_needs_a_header_owned_by_the_user() {
        let mut store = FakeStore::default();
        save(&leg_day(), "u1", &mut store).unwrap();
        assert!(matches!(
            retry_rows(&leg_day(), "u2", 41, &mut store),
            Err(Error::Store(DbError::WorkoutNotFound(41)))
        ));
        assert!(matches!(
            retry_rows(&leg_day(), "u1", 7, &mut store),
            Err(Error::Store(DbError::WorkoutNotFound(7)))
        ));
        assert_eq!(store.row_batches.len(), 1);
    }
}
