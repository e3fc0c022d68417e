use anyhow::{anyhow, Context, Result};
// Use anyhow::Result as standard Result for service layer
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// --- Declare modules ---
pub mod aggregate;
mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod generator;
pub mod model;
pub mod plan;
pub mod series;
pub mod session;

// --- Expose public types ---
pub use config::{
    get_config_path as get_config_path_util,
    load_config as load_config_util,
    parse_color,
    save_config as save_config_util,
    Config,
    Error as ConfigError,
    GeneratorConfig,
    StandardColor,
    Theme,
    Units,
};

pub use db::{
    get_db_path as get_db_path_util,
    Error as DbError,
    SqliteStore,
    WorkoutStore,
};

pub use draft::Draft;
pub use error::Error as CoreError;
pub use generator::{GeminiGenerator, Generator};
pub use model::{ExerciseGroup, FlatExerciseRow, Metric, SetEntry, WorkoutRecord, WorkoutRow};
pub use series::Series;

use session::{Latest, SingleFlight};

pub struct AppService {
    pub config: Config,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    store: Box<dyn WorkoutStore>,
    workouts: Latest<Vec<WorkoutRecord>>,
    generation: SingleFlight,
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = db::get_db_path().context("Failed to determine database path")?;
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;
        info!(db = %db_path.display(), "opened workout store");

        Ok(Self::with_store(config, config_path, db_path, Box::new(store)))
    }

    /// Builds a service over an already-opened store.
    #[must_use]
    pub fn with_store(
        config: Config,
        config_path: PathBuf,
        db_path: PathBuf,
        store: Box<dyn WorkoutStore>,
    ) -> Self {
        Self {
            config,
            db_path,
            config_path,
            store,
            workouts: Latest::new(),
            generation: SingleFlight::new(),
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save_config(&self.config_path, &self.config)
    }

    /// The signed-in user.
    /// # Errors
    /// Returns `ConfigError::UserNotSet` when nobody is signed in.
    pub fn require_user(&self) -> Result<&str, ConfigError> {
        self.config
            .user_id
            .as_deref()
            .ok_or_else(|| ConfigError::UserNotSet(self.config_path.clone()))
    }

    /// Signs a user in (or clears the user with `None`) and persists it.
    /// # Errors
    /// - `ConfigError::EmptyUserId` for a blank id.
    /// - `ConfigError` variants if saving fails.
    pub fn set_user(&mut self, user_id: Option<&str>) -> Result<(), ConfigError> {
        let user_id = match user_id.map(str::trim) {
            Some("") => return Err(ConfigError::EmptyUserId),
            other => other.map(str::to_string),
        };
        self.config.user_id = user_id;
        self.save_config()
    }

    /// Sets the display units and persists them.
    /// # Errors
    /// Returns `ConfigError` variants if saving fails.
    pub fn set_units(&mut self, units: Units) -> Result<(), ConfigError> {
        self.config.units = units;
        self.save_config()
    }

    /// The user's workouts, newest first, each with its grouped exercises.
    /// # Errors
    /// Fails when no user is set or the store cannot be read.
    pub fn list_workouts(&mut self, limit: Option<u32>) -> Result<&[WorkoutRecord]> {
        // Fetch and accept happen in one blocking call here, so the ticket is
        // never stale. It matters for front ends that overlap refreshes.
        let ticket = self.workouts.begin();
        let fetched = self.fetch_workouts(limit)?;
        debug!(count = fetched.len(), "fetched workouts");
        self.workouts.accept(ticket, fetched);
        Ok(self.workouts.get().map(Vec::as_slice).unwrap_or_default())
    }

    fn fetch_workouts(&self, limit: Option<u32>) -> Result<Vec<WorkoutRecord>> {
        let owner_id = self.require_user()?;
        let rows = self
            .store
            .list_workouts(owner_id, limit)
            .context("Failed to list workouts")?;
        let flat = self
            .store
            .list_exercise_rows_for_owner(owner_id)
            .context("Failed to read exercise rows")?;
        let mut grouped = aggregate::group_by_workout(&flat);
        Ok(rows
            .into_iter()
            .map(|row| {
                let exercises = grouped.remove(&row.id).unwrap_or_default();
                WorkoutRecord::from_row(row, exercises)
            })
            .collect())
    }

    /// One workout of the current user with its grouped exercises.
    /// # Errors
    /// Fails with `DbError::WorkoutNotFound` when the workout does not exist or belongs to someone else.
    pub fn get_workout(&self, workout_id: i64) -> Result<WorkoutRecord> {
        let owner_id = self.require_user()?;
        let row = self
            .store
            .get_workout(owner_id, workout_id)
            .context("Failed to read workout")?
            .ok_or(DbError::WorkoutNotFound(workout_id))?;
        let flat = self
            .store
            .list_exercise_rows(workout_id)
            .context("Failed to read exercise rows")?;
        Ok(WorkoutRecord::from_row(row, aggregate::group(&flat)))
    }

    /// Distinct exercise types the user has logged, alphabetical.
    /// # Errors
    /// Fails when no user is set or the store cannot be read.
    pub fn exercise_types(&self) -> Result<Vec<String>> {
        let owner_id = self.require_user()?;
        Ok(self.store.exercise_types(owner_id)?)
    }

    /// Matches user input against logged exercise types ignoring case.
    /// Falls back to the trimmed input when nothing matches.
    /// # Errors
    /// Fails when no user is set or the store cannot be read.
    pub fn resolve_exercise_type(&self, input: &str) -> Result<String> {
        let input = input.trim();
        Ok(self
            .exercise_types()?
            .into_iter()
            .find(|t| t.eq_ignore_ascii_case(input))
            .unwrap_or_else(|| input.to_string()))
    }

    /// Chart series of one exercise, oldest point first.
    /// # Errors
    /// Fails when no user is set or the store cannot be read.
    pub fn exercise_series(&self, exercise_type: &str, metric: Metric) -> Result<Series> {
        let owner_id = self.require_user()?;
        let exercise_type = self.resolve_exercise_type(exercise_type)?;
        let rows = self
            .store
            .list_rows_for_exercise(owner_id, &exercise_type)
            .with_context(|| format!("Failed to read sets of {exercise_type}"))?;
        Ok(series::build_series(&rows, &exercise_type, metric))
    }

    /// Builds the configured remote generator.
    /// # Errors
    /// Returns `ConfigError::ApiKeyMissing` if the key variable is unset.
    pub fn generator(&self) -> Result<GeminiGenerator, ConfigError> {
        GeminiGenerator::from_config(&self.config.generator)
    }

    /// Generates a validated plan from the user's full history.
    /// # Errors
    /// Fails while another generation is running, or with `CoreError::Generation`/`CoreError::Validation`.
    pub fn generate_plan(
        &self,
        generator: &dyn Generator,
        focus: Option<&str>,
        preferences: Option<&str>,
    ) -> Result<Vec<ExerciseGroup>> {
        // Never contested from the blocking CLI. Kept so a front end that
        // re-enters while a request is out gets a clean refusal.
        let _in_flight = self
            .generation
            .try_start()
            .ok_or_else(|| anyhow!("A workout is already being generated"))?;
        let history = self.fetch_workouts(None)?;
        Ok(plan::ingest_plan(generator, &history, focus, preferences)?)
    }

    /// Persists a draft for the current user.
    /// # Errors
    /// Returns a `CoreError` (`Validation`, `Store` or `PartialPersistence`) wrapped in `anyhow`.
    pub fn save_draft(&mut self, draft: &Draft) -> Result<WorkoutRecord> {
        let owner_id = self.require_user()?.to_string();
        Ok(draft::save(draft, &owner_id, self.store.as_mut())?)
    }

    /// Retries writing the rows of a partially saved workout of the current user.
    /// # Errors
    /// - `CoreError::Store` wrapping `DbError::WorkoutNotFound` when the workout is not the user's.
    /// - `CoreError::PartialPersistence` if the retry fails again.
    pub fn retry_exercise_rows(&mut self, workout_id: i64, draft: &Draft) -> Result<usize> {
        let owner_id = self.require_user()?.to_string();
        Ok(draft::retry_rows(draft, &owner_id, workout_id, self.store.as_mut())?)
    }

    /// Deletes a workout and its rows. Also the discard path after a partial save.
    /// # Errors
    /// Fails with `DbError::WorkoutNotFound` when the workout is not the user's.
    pub fn discard_workout(&mut self, workout_id: i64) -> Result<usize> {
        let owner_id = self.require_user()?.to_string();
        let removed = self.store.delete_workout(&owner_id, workout_id)?;
        info!(workout_id, removed, "deleted workout");
        Ok(removed)
    }
}
