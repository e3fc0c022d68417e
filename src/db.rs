//src/db.rs
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::model::{FlatExerciseRow, WorkoutRow};

// Custom Error type for store operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Workout not found: ID {0}")]
    WorkoutNotFound(i64),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
}

const DB_FILE_NAME: &str = "liftlog.sqlite";
const APP_DATA_DIR: &str = "liftlog";

/// Persistence capability consumed by the service and the draft save.
///
/// Every read and delete is scoped to the owning user.
pub trait WorkoutStore {
    /// Creates a workout header and returns it with its new id.
    fn insert_workout(
        &mut self,
        owner_id: &str,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<WorkoutRow, Error>;

    /// Inserts a batch of exercise rows. The batch is all-or-nothing.
    fn insert_exercise_rows(&mut self, rows: &[FlatExerciseRow]) -> Result<usize, Error>;

    /// Workouts of one user, newest first.
    fn list_workouts(&self, owner_id: &str, limit: Option<u32>) -> Result<Vec<WorkoutRow>, Error>;

    fn get_workout(&self, owner_id: &str, workout_id: i64) -> Result<Option<WorkoutRow>, Error>;

    /// Rows of one workout in insertion order.
    fn list_exercise_rows(&self, workout_id: i64) -> Result<Vec<FlatExerciseRow>, Error>;

    /// Every row the user logged, newest workout first, insertion order inside a workout.
    fn list_exercise_rows_for_owner(&self, owner_id: &str) -> Result<Vec<FlatExerciseRow>, Error>;

    /// Rows of one exercise type, newest first.
    fn list_rows_for_exercise(
        &self,
        owner_id: &str,
        exercise_type: &str,
    ) -> Result<Vec<FlatExerciseRow>, Error>;

    /// Distinct exercise types the user logged, alphabetical.
    fn exercise_types(&self, owner_id: &str) -> Result<Vec<String>, Error>;

    /// Deletes a workout and its exercise rows. Returns the number of exercise rows removed.
    fn delete_workout(&mut self, owner_id: &str, workout_id: i64) -> Result<usize, Error>;
}

/// Gets the path to the SQLite database file within the app's data directory.
/// Exposed at crate root as get_db_path_util
pub fn get_db_path() -> Result<PathBuf, Error> {
    let data_dir = dirs::data_dir().ok_or(Error::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    Connection::open(path).map_err(Error::Connection)
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(Error::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            date TEXT NOT NULL -- RFC3339, millisecond precision, UTC
        )",
        [],
    )
    .map_err(Error::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workout_id INTEGER NOT NULL REFERENCES workouts(id),
            type TEXT NOT NULL,
            set_number INTEGER NOT NULL CHECK(set_number > 0),
            reps INTEGER CHECK(reps IS NULL OR reps >= 0),
            weight REAL CHECK(weight IS NULL OR weight >= 0),
            duration REAL CHECK(duration IS NULL OR duration >= 0),
            created_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(Error::Connection)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workouts_owner_date ON workouts(owner_id, date)",
        [],
    )
    .map_err(Error::Connection)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exercises_workout_id ON exercises(workout_id)",
        [],
    )
    .map_err(Error::Connection)?;

    Ok(())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

// Helper function to map a database row to a WorkoutRow struct
fn map_row_to_workout(row: &Row) -> Result<WorkoutRow, rusqlite::Error> {
    let date_str: String = row.get(3)?;
    Ok(WorkoutRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        date: parse_timestamp(&date_str, 3)?,
    })
}

// Column order: workout_id, type, set_number, reps, weight, duration, created_at
fn map_row_to_exercise_row(row: &Row) -> Result<FlatExerciseRow, rusqlite::Error> {
    let created_str: String = row.get(6)?;
    Ok(FlatExerciseRow {
        workout_id: row.get(0)?,
        exercise_type: row.get(1)?,
        set_number: row.get(2)?,
        reps: row.get(3)?,
        weight: row.get(4)?,
        duration: row.get(5)?,
        created_at: parse_timestamp(&created_str, 6)?,
    })
}

const EXERCISE_COLUMNS: &str =
    "e.workout_id, e.type, e.set_number, e.reps, e.weight, e.duration, e.created_at";

/// `WorkoutStore` backed by a local SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens the database at `path` and makes sure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = open_db(path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// An initialized in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(Error::Connection)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn query_exercise_rows(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<FlatExerciseRow>, Error> {
        let mut stmt = self.conn.prepare(sql).map_err(Error::QueryFailed)?;
        let rows = stmt
            .query_map(params, map_row_to_exercise_row)
            .map_err(Error::QueryFailed)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(Error::QueryFailed)
    }
}

impl WorkoutStore for SqliteStore {
    fn insert_workout(
        &mut self,
        owner_id: &str,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<WorkoutRow, Error> {
        self.conn
            .execute(
                "INSERT INTO workouts (owner_id, name, date) VALUES (?1, ?2, ?3)",
                params![owner_id, name, format_timestamp(date)],
            )
            .map_err(Error::InsertFailed)?;
        let id = self.conn.last_insert_rowid();
        debug!(workout_id = id, owner_id, "inserted workout");
        Ok(WorkoutRow {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            date,
        })
    }

    fn insert_exercise_rows(&mut self, rows: &[FlatExerciseRow]) -> Result<usize, Error> {
        let tx = self.conn.transaction().map_err(Error::InsertFailed)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO exercises (workout_id, type, set_number, reps, weight, duration, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(Error::InsertFailed)?;
            for row in rows {
                stmt.execute(params![
                    row.workout_id,
                    row.exercise_type,
                    row.set_number,
                    row.reps,
                    row.weight,
                    row.duration,
                    format_timestamp(row.created_at),
                ])
                .map_err(Error::InsertFailed)?;
            }
        }
        tx.commit().map_err(Error::InsertFailed)?;
        debug!(count = rows.len(), "inserted exercise rows");
        Ok(rows.len())
    }

    fn list_workouts(&self, owner_id: &str, limit: Option<u32>) -> Result<Vec<WorkoutRow>, Error> {
        let mut sql =
            "SELECT id, owner_id, name, date FROM workouts WHERE owner_id = ?1 ORDER BY date DESC, id DESC"
                .to_string();
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(owner_id.to_string())];
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(limit));
        }
        let params_slice: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql).map_err(Error::QueryFailed)?;
        let iter = stmt
            .query_map(params_slice.as_slice(), map_row_to_workout)
            .map_err(Error::QueryFailed)?;
        iter.collect::<Result<Vec<_>, _>>()
            .map_err(Error::QueryFailed)
    }

    fn get_workout(&self, owner_id: &str, workout_id: i64) -> Result<Option<WorkoutRow>, Error> {
        self.conn
            .query_row(
                "SELECT id, owner_id, name, date FROM workouts WHERE id = ?1 AND owner_id = ?2",
                params![workout_id, owner_id],
                map_row_to_workout,
            )
            .optional()
            .map_err(Error::QueryFailed)
    }

    fn list_exercise_rows(&self, workout_id: i64) -> Result<Vec<FlatExerciseRow>, Error> {
        let sql = format!(
            "SELECT {EXERCISE_COLUMNS} FROM exercises e WHERE e.workout_id = ?1 ORDER BY e.id ASC"
        );
        self.query_exercise_rows(&sql, params![workout_id])
    }

    fn list_exercise_rows_for_owner(&self, owner_id: &str) -> Result<Vec<FlatExerciseRow>, Error> {
        let sql = format!(
            "SELECT {EXERCISE_COLUMNS}
             FROM exercises e
             JOIN workouts w ON w.id = e.workout_id
             WHERE w.owner_id = ?1
             ORDER BY w.date DESC, w.id DESC, e.id ASC"
        );
        self.query_exercise_rows(&sql, params![owner_id])
    }

    fn list_rows_for_exercise(
        &self,
        owner_id: &str,
        exercise_type: &str,
    ) -> Result<Vec<FlatExerciseRow>, Error> {
        let sql = format!(
            "SELECT {EXERCISE_COLUMNS}
             FROM exercises e
             JOIN workouts w ON w.id = e.workout_id
             WHERE w.owner_id = ?1 AND e.type = ?2
             ORDER BY e.created_at DESC, e.id DESC"
        );
        self.query_exercise_rows(&sql, params![owner_id, exercise_type])
    }

    fn exercise_types(&self, owner_id: &str) -> Result<Vec<String>, Error> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT e.type
                 FROM exercises e
                 JOIN workouts w ON w.id = e.workout_id
                 WHERE w.owner_id = ?1
                 ORDER BY e.type ASC",
            )
            .map_err(Error::QueryFailed)?;
        let iter = stmt
            .query_map(params![owner_id], |row| row.get::<_, String>(0))
            .map_err(Error::QueryFailed)?;
        iter.collect::<Result<Vec<_>, _>>()
            .map_err(Error::QueryFailed)
    }

    fn delete_workout(&mut self, owner_id: &str, workout_id: i64) -> Result<usize, Error> {
        let tx = self.conn.transaction().map_err(Error::DeleteFailed)?;
        let owned: Option<i64> = tx
            .query_row(
                "SELECT id FROM workouts WHERE id = ?1 AND owner_id = ?2",
                params![workout_id, owner_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::QueryFailed)?;
        if owned.is_none() {
            return Err(Error::WorkoutNotFound(workout_id));
        }
        let removed_rows = tx
            .execute("DELETE FROM exercises WHERE workout_id = ?1", params![workout_id])
            .map_err(Error::DeleteFailed)?;
        tx.execute("DELETE FROM workouts WHERE id = ?1", params![workout_id])
            .map_err(Error::DeleteFailed)?;
        tx.commit().map_err(Error::DeleteFailed)?;
        Ok(removed_rows)
    }
}
