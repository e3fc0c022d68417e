// src/cli.rs
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use liftlog_lib::{Metric, Units};

#[derive(Parser, Debug)]
#[command(author, version, about = "Log workouts, chart progress and generate plans", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Write tabular output as CSV to stdout
    #[arg(long, global = true)]
    pub export_csv: bool,
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitsCli {
    Metric,
    Imperial,
}

impl From<UnitsCli> for Units {
    fn from(value: UnitsCli) -> Self {
        match value {
            UnitsCli::Metric => Self::Metric,
            UnitsCli::Imperial => Self::Imperial,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricCli {
    Reps,
    Weight,
    Duration,
}

impl From<MetricCli> for Metric {
    fn from(value: MetricCli) -> Self {
        match value {
            MetricCli::Reps => Self::Reps,
            MetricCli::Weight => Self::Weight,
            MetricCli::Duration => Self::Duration,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in as a user (all workouts are scoped to this id)
    SetUser {
        /// User id to sign in as
        id: String,
    },
    /// Show the signed-in user
    Whoami,
    /// Sign out
    SignOut,
    /// Set the weight units used for display
    SetUnits {
        #[arg(value_enum)]
        units: UnitsCli,
    },
    /// Show the path to the database file
    DbPath,
    /// Show the path to the config file
    ConfigPath,
    /// List workouts, newest first, with their exercises
    List {
        /// Show only the last N workouts
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show one workout in detail
    Show {
        /// ID of the workout
        id: i64,
    },
    /// List the exercise types you have logged
    Exercises,
    /// Show the progress series of one exercise
    Progress {
        /// Exercise type (case-insensitive)
        #[arg(short, long)]
        exercise: String,
        /// Which set field to chart
        #[arg(short, long, value_enum, default_value_t = MetricCli::Weight)]
        metric: MetricCli,
    },
    /// Build a workout interactively and save it
    Log {
        /// Workout name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Generate a workout plan from your history, then edit and save it
    Generate {
        /// What the workout should focus on (e.g. "legs", "endurance")
        #[arg(short, long)]
        focus: Option<String>,
        /// Exercise preferences (e.g. "no machines, include deadlifts")
        #[arg(short, long)]
        preferences: Option<String>,
        /// Name for the generated workout
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Delete a workout and its sets
    DeleteWorkout {
        /// ID of the workout to delete
        id: i64,
    },
    GenerateCompletion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
