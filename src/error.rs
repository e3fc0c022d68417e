//src/error.rs
use thiserror::Error;

use crate::db::Error as DbError;

/// Failures surfaced by the aggregation, ingestion and draft operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] DbError),
    #[error("Workout generation failed: {0}")]
    Generation(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    /// Zero-based index, shown one-based.
    #[error("No exercise at position {}", .0 + 1)]
    ExerciseIndex(usize),
    #[error("No set at exercise {exercise_index}, set {set_index}")]
    Index {
        exercise_index: usize,
        set_index: usize,
    },
    #[error("Workout {workout_id} was saved but its exercises were not: {source}")]
    PartialPersistence {
        workout_id: i64,
        #[source]
        source: DbError,
    },
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }
}
