//src/series.rs
//! Projects logged sets of one exercise into a chartable series.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{FlatExerciseRow, Metric, SetEntry, WorkoutRecord};

/// Label of the placeholder point emitted when nothing matched.
pub const NO_DATA_LABEL: &str = "No Data";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl Series {
    fn no_data() -> Self {
        Self {
            labels: vec![NO_DATA_LABEL.to_string()],
            values: vec![0.0],
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.labels.len() == 1 && self.labels[0] == NO_DATA_LABEL
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

struct Point {
    set_number: u32,
    date: DateTime<Utc>,
    value: f64,
}

fn point_label(set_number: u32, date: DateTime<Utc>) -> String {
    format!("Set {} ({})", set_number, date.format("%b %-d"))
}

/// Takes points in newest-first order and lays them out oldest to newest.
fn finish(mut newest_first: Vec<Point>) -> Series {
    if newest_first.is_empty() {
        return Series::no_data();
    }
    newest_first.reverse();
    let (labels, values) = newest_first
        .into_iter()
        .map(|p| (point_label(p.set_number, p.date), p.value))
        .unzip();
    Series { labels, values }
}

/// Builds a series from flat rows as the store returns them: newest first.
/// The most recent set ends up as the rightmost point. Missing values plot
/// as 0.
#[must_use]
pub fn build_series(rows: &[FlatExerciseRow], exercise_type: &str, metric: Metric) -> Series {
    let points = rows
        .iter()
        .filter(|row| row.exercise_type == exercise_type)
        .map(|row| Point {
            set_number: row.set_number,
            date: row.created_at,
            value: SetEntry::from(row).value(metric).unwrap_or(0.0),
        })
        .collect();
    finish(points)
}

/// Builds a series from nested workouts ordered newest first, as listed by
/// the service. Sets inside one workout keep their logged order.
#[must_use]
pub fn build_series_from_workouts(
    workouts: &[WorkoutRecord],
    exercise_type: &str,
    metric: Metric,
) -> Series {
    let mut points = Vec::new();
    for workout in workouts {
        for group in workout
            .exercises
            .iter()
            .filter(|g| g.exercise_type == exercise_type)
        {
            for set in group.sets.iter().rev() {
                points.push(Point {
                    set_number: set.set_number,
                    date: workout.date,
                    value: set.value(metric).unwrap_or(0.0),
                });
            }
        }
    }
    finish(points)
}
