//src/main.rs
mod cli; // Keep cli module for parsing args

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io;
use std::io::{stdin, stdout, BufRead, Write}; // For prompts
use strum::IntoEnumIterator;
use tracing_subscriber::EnvFilter;

use liftlog_lib::{
    AppService, ConfigError, CoreError, DbError, Draft, ExerciseGroup, Metric, Series, Units,
    WorkoutRecord,
};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // --- Check for completion generation request FIRST ---
    let cli_args = cli::parse_args(); // Parse arguments once
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command(); // Get the command structure
        let bin_name = cmd.get_name().to_string(); // Get the binary name

        eprintln!("Generating completion script for {shell}..."); // Print to stderr
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout()); // Print script to stdout
        return Ok(()); // Exit after generating script
    }

    init_tracing(cli_args.verbose);

    // Initialize the application service (loads config, connects to DB)
    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;
    let header_color = liftlog_lib::parse_color(&service.config.theme.header_color)
        .map(Color::from)
        .unwrap_or(Color::Green); // Fallback

    // --- Execute Commands using AppService ---
    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            // This case is handled above, but keep it exhaustive
            unreachable!("Completion generation should have exited already");
        }
        // --- Session / Config Commands ---
        cli::Commands::SetUser { id } => {
            service.set_user(Some(id.as_str()))?;
            println!("Signed in as '{}'.", id.trim());
        }
        cli::Commands::Whoami => match service.require_user() {
            Ok(user) => println!("{user}"),
            Err(ConfigError::UserNotSet(_)) => println!("Not signed in."),
            Err(e) => bail!(e),
        },
        cli::Commands::SignOut => {
            service.set_user(None)?;
            println!("Signed out.");
        }
        cli::Commands::SetUnits { units } => {
            let units = Units::from(units);
            service.set_units(units)?;
            println!("Units set to {units:?}. Weights are shown in {}.", units.weight_label());
        }
        cli::Commands::DbPath => {
            println!("Database file is located at: {:?}", service.db_path);
        }
        cli::Commands::ConfigPath => {
            println!("Config file is located at: {:?}", service.get_config_path());
        }

        // --- Workout Commands ---
        cli::Commands::List { limit } => {
            let units = service.config.units;
            let workouts = service.list_workouts(limit)?;
            if workouts.is_empty() {
                println!("No workouts logged yet.");
            } else if export_csv {
                print_workouts_csv(workouts)?;
            } else {
                print_workouts_table(workouts, header_color, units);
            }
        }
        cli::Commands::Show { id } => match service.get_workout(id) {
            Ok(workout) => {
                if export_csv {
                    print_workouts_csv(std::slice::from_ref(&workout))?;
                } else {
                    print_workout_detail(&workout, header_color, service.config.units);
                }
            }
            Err(e) => {
                if let Some(DbError::WorkoutNotFound(id)) = e.downcast_ref::<DbError>() {
                    println!("Workout {id} not found.");
                    return Ok(());
                }
                bail!("Error showing workout {}: {}", id, e);
            }
        },
        cli::Commands::Exercises => {
            let types = service.exercise_types()?;
            if types.is_empty() {
                println!("No exercises logged yet.");
            } else if export_csv {
                let mut writer = csv::Writer::from_writer(io::stdout());
                writer.write_record(["Exercise"])?;
                for exercise_type in types {
                    writer.write_record([exercise_type])?;
                }
                writer.flush()?;
            } else {
                for exercise_type in types {
                    println!("{exercise_type}");
                }
            }
        }
        cli::Commands::Progress { exercise, metric } => {
            let metric = Metric::from(metric);
            let series = service.exercise_series(&exercise, metric)?;
            if export_csv {
                print_series_csv(&series, metric)?;
            } else {
                print_series_table(&series, metric, header_color, service.config.units);
            }
        }
        cli::Commands::DeleteWorkout { id } => match service.discard_workout(id) {
            Ok(rows) => println!("Deleted workout {id} ({rows} set(s) removed)."),
            Err(e) => {
                if let Some(DbError::WorkoutNotFound(id)) = e.downcast_ref::<DbError>() {
                    println!("Workout {id} not found.");
                    return Ok(());
                }
                bail!("Error deleting workout {}: {}", id, e);
            }
        },

        // --- Draft Commands ---
        cli::Commands::Log { name } => {
            service.require_user()?;
            let name = match name {
                Some(name) => name,
                None => prompt_line("Workout name: ")?,
            };
            run_editor(&mut service, Draft::new(name), header_color)?;
        }
        cli::Commands::Generate {
            focus,
            preferences,
            name,
        } => {
            service.require_user()?;
            let generator = service.generator()?;
            println!("Generating workout...");
            let plan = match service.generate_plan(&generator, focus.as_deref(), preferences.as_deref())
            {
                Ok(plan) => plan,
                Err(e) => match e.downcast_ref::<CoreError>() {
                    Some(CoreError::Validation(_)) => {
                        bail!("The generated workout could not be used: {}", e)
                    }
                    _ => bail!("Error generating workout: {}", e),
                },
            };
            print_plan_table(&plan, header_color, service.config.units);
            let name = name.unwrap_or_else(|| {
                focus
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map_or_else(|| "Generated workout".to_string(), |f| format!("Generated: {f}"))
            });
            run_editor(&mut service, Draft::from_plan(name, plan), header_color)?;
        }
    }

    Ok(())
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    stdout().flush()?;
    let mut input = String::new();
    let read = stdin().lock().read_line(&mut input)?;
    if read == 0 {
        bail!("Input closed");
    }
    Ok(input.trim().to_string())
}

// --- Draft editor ---

#[derive(Debug, PartialEq)]
enum EditorCommand {
    Add {
        exercise_type: String,
        sets: u32,
        reps: Option<u32>,
        weight: Option<f64>,
        duration: Option<f64>,
    },
    AddSet {
        exercise: usize,
        reps: Option<u32>,
        weight: Option<f64>,
        duration: Option<f64>,
    },
    Set {
        exercise: usize,
        set: usize,
        metric: Metric,
        raw: String,
    },
    Remove {
        exercise: usize,
    },
    Name(String),
    Show,
    Save,
    Quit,
    Help,
}

const EDITOR_HELP: &str = "Commands:
  add <type> <sets> [reps] [weight] [duration]
  add-set <exercise#> [reps] [weight] [duration]
  set <exercise#> <set#> <reps|weight|duration> [value]   (no value clears it)
  remove <exercise#>
  name <text>
  show | save | quit | help";

fn parse_index(token: Option<&str>, what: &str) -> Result<usize, String> {
    let token = token.ok_or_else(|| format!("missing {what} number"))?;
    match token.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("'{token}' is not a valid {what} number")),
    }
}

/// Optional trailing numbers; `-` skips a value.
fn parse_optional<T: std::str::FromStr>(token: Option<&str>, what: &str) -> Result<Option<T>, String> {
    match token {
        None | Some("-") => Ok(None),
        Some(t) => t
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("'{t}' is not a valid {what}")),
    }
}

fn metric_names() -> String {
    Metric::iter().map(|m| m.to_string()).collect::<Vec<_>>().join(", ")
}

fn parse_editor_command(line: &str) -> Result<EditorCommand, String> {
    let mut tokens = line.split_whitespace();
    let Some(keyword) = tokens.next() else {
        return Ok(EditorCommand::Help);
    };
    match keyword.to_ascii_lowercase().as_str() {
        "add" => {
            let rest: Vec<&str> = tokens.collect();
            // The type may contain spaces; it runs up to the first whole number.
            let split = rest
                .iter()
                .position(|t| t.parse::<u32>().is_ok())
                .ok_or("usage: add <type> <sets> [reps] [weight] [duration]")?;
            let exercise_type = rest[..split].join(" ");
            if exercise_type.is_empty() {
                return Err("missing exercise type".into());
            }
            let mut values = rest[split..].iter().copied();
            let sets = parse_optional::<u32>(values.next(), "set count")?.unwrap_or(0);
            let cmd = EditorCommand::Add {
                exercise_type,
                sets,
                reps: parse_optional(values.next(), "rep count")?,
                weight: parse_optional(values.next(), "weight")?,
                duration: parse_optional(values.next(), "duration")?,
            };
            Ok(cmd)
        }
        "add-set" => Ok(EditorCommand::AddSet {
            exercise: parse_index(tokens.next(), "exercise")?,
            reps: parse_optional(tokens.next(), "rep count")?,
            weight: parse_optional(tokens.next(), "weight")?,
            duration: parse_optional(tokens.next(), "duration")?,
        }),
        "set" => {
            let exercise = parse_index(tokens.next(), "exercise")?;
            let set = parse_index(tokens.next(), "set")?;
            let field = tokens
                .next()
                .ok_or_else(|| format!("missing field ({})", metric_names()))?;
            let metric = field
                .parse::<Metric>()
                .map_err(|_| format!("unknown field '{field}', expected one of: {}", metric_names()))?;
            Ok(EditorCommand::Set {
                exercise,
                set,
                metric,
                raw: tokens.collect::<Vec<_>>().join(" "),
            })
        }
        "remove" | "rm" => Ok(EditorCommand::Remove {
            exercise: parse_index(tokens.next(), "exercise")?,
        }),
        "name" => {
            let name = tokens.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err("usage: name <text>".into());
            }
            Ok(EditorCommand::Name(name))
        }
        "show" | "ls" => Ok(EditorCommand::Show),
        "save" => Ok(EditorCommand::Save),
        "quit" | "q" | "exit" => Ok(EditorCommand::Quit),
        "help" | "?" => Ok(EditorCommand::Help),
        other => Err(format!("unknown command '{other}', type 'help'")),
    }
}

/// Interactive loop over one draft. Returns when the draft is saved or abandoned.
fn run_editor(service: &mut AppService, mut draft: Draft, header_color: Color) -> Result<()> {
    let units = service.config.units;
    println!("Editing draft '{}'. Type 'help' for commands.", draft.name);
    print_draft_table(&draft, header_color, units);

    loop {
        let line = match prompt_line("draft> ") {
            Ok(line) => line,
            Err(_) => {
                println!("Input closed, draft discarded.");
                return Ok(());
            }
        };
        let command = match parse_editor_command(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };
        let outcome = match command {
            EditorCommand::Add {
                exercise_type,
                sets,
                reps,
                weight,
                duration,
            } => draft
                .add_exercise(&exercise_type, sets, reps, weight, duration)
                .map(|g| println!("Added {} with {} set(s).", g.exercise_type, g.sets.len())),
            EditorCommand::AddSet {
                exercise,
                reps,
                weight,
                duration,
            } => draft
                .add_set(exercise, reps, weight, duration)
                .map(|s| println!("Added set {}.", s.set_number)),
            EditorCommand::Set {
                exercise,
                set,
                metric,
                raw,
            } => draft
                .update_set_value(exercise, set, metric, &raw)
                .map(|value| match value {
                    Some(v) => println!("Set {metric} to {v}."),
                    None => println!("Cleared {metric}."),
                }),
            EditorCommand::Remove { exercise } => draft
                .remove_exercise(exercise)
                .map(|g| println!("Removed {}.", g.exercise_type)),
            EditorCommand::Name(name) => {
                draft.rename(name);
                Ok(())
            }
            EditorCommand::Show => {
                print_draft_table(&draft, header_color, units);
                Ok(())
            }
            EditorCommand::Help => {
                println!("{EDITOR_HELP}");
                Ok(())
            }
            EditorCommand::Quit => {
                println!("Draft discarded.");
                return Ok(());
            }
            EditorCommand::Save => {
                if save_with_repair(service, &draft)? {
                    return Ok(());
                }
                Ok(())
            }
        };
        if let Err(e) = outcome {
            println!("{e}");
        }
    }
}

/// Saves the draft. On a partial save offers retry or discard of the orphaned workout.
/// Returns `true` when the editor should close.
fn save_with_repair(service: &mut AppService, draft: &Draft) -> Result<bool> {
    let err = match service.save_draft(draft) {
        Ok(record) => {
            println!(
                "Saved workout '{}' (ID {}) with {} set(s).",
                record.name,
                record.id.unwrap_or_default(),
                record.total_sets()
            );
            return Ok(true);
        }
        Err(err) => err,
    };

    let workout_id = match err.downcast_ref::<CoreError>() {
        Some(CoreError::PartialPersistence { workout_id, .. }) => *workout_id,
        Some(CoreError::Validation(msg)) => {
            println!("Cannot save yet: {msg}");
            return Ok(false);
        }
        _ => {
            println!("Error saving workout: {err:#}");
            return Ok(false);
        }
    };

    println!("Workout {workout_id} was created but its sets were not saved: {err:#}");
    loop {
        let answer = prompt_line("[r]etry saving the sets, [d]iscard the workout, or [k]eep editing? ")?;
        match answer.to_ascii_lowercase().as_str() {
            "r" | "retry" => match service.retry_exercise_rows(workout_id, draft) {
                Ok(rows) => {
                    println!("Saved {rows} set(s) to workout {workout_id}.");
                    return Ok(true);
                }
                Err(e) => println!("Retry failed: {e:#}"),
            },
            "d" | "discard" => {
                service
                    .discard_workout(workout_id)
                    .with_context(|| format!("Failed to discard workout {workout_id}"))?;
                println!("Discarded workout {workout_id}. The draft is still open.");
                return Ok(false);
            }
            "k" | "keep" => {
                println!("Workout {workout_id} is kept without sets; 'save' will create a new one.");
                return Ok(false);
            }
            _ => println!("Please answer r, d or k."),
        }
    }
}

// --- Output helpers ---

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn csv_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

fn new_table(headers: Vec<String>, header_color: Color) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .into_iter()
                .map(|h| Cell::new(h).fg(header_color).add_attribute(Attribute::Bold)),
        );
    table
}

fn set_headers(units: Units) -> Vec<String> {
    vec![
        "Set".to_string(),
        "Reps".to_string(),
        format!("Weight ({})", units.weight_label()),
        "Duration".to_string(),
    ]
}

fn add_group_rows(table: &mut Table, index: Option<usize>, group: &ExerciseGroup) {
    for (i, set) in group.sets.iter().enumerate() {
        let label = if i == 0 {
            match index {
                Some(n) => format!("{}. {}", n + 1, group.exercise_type),
                None => group.exercise_type.clone(),
            }
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(label),
            Cell::new(set.set_number),
            Cell::new(fmt_opt(set.reps)),
            Cell::new(fmt_opt(set.weight)),
            Cell::new(fmt_opt(set.duration)),
        ]);
    }
}

fn print_workouts_table(workouts: &[WorkoutRecord], header_color: Color, units: Units) {
    let mut headers = vec![
        "ID".to_string(),
        "Date".to_string(),
        "Workout".to_string(),
        "Exercise".to_string(),
    ];
    headers.extend(set_headers(units));
    let mut table = new_table(headers, header_color);

    for workout in workouts {
        let mut first = true;
        for group in &workout.exercises {
            for (i, set) in group.sets.iter().enumerate() {
                let (id, date, name) = if first {
                    first = false;
                    (
                        fmt_opt(workout.id),
                        workout.date.format("%Y-%m-%d %H:%M").to_string(),
                        workout.name.clone(),
                    )
                } else {
                    (String::new(), String::new(), String::new())
                };
                let exercise = if i == 0 { group.exercise_type.clone() } else { String::new() };
                table.add_row(vec![
                    Cell::new(id),
                    Cell::new(date),
                    Cell::new(name),
                    Cell::new(exercise),
                    Cell::new(set.set_number),
                    Cell::new(fmt_opt(set.reps)),
                    Cell::new(fmt_opt(set.weight)),
                    Cell::new(fmt_opt(set.duration)),
                ]);
            }
        }
        if first {
            table.add_row(vec![
                Cell::new(fmt_opt(workout.id)),
                Cell::new(workout.date.format("%Y-%m-%d %H:%M")),
                Cell::new(&workout.name),
                Cell::new("(no sets)").add_attribute(Attribute::Italic),
            ]);
        }
    }
    println!("{table}");
}

fn print_workouts_csv(workouts: &[WorkoutRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "WorkoutID",
        "Date_UTC",
        "Workout",
        "Exercise",
        "Set",
        "Reps",
        "Weight",
        "Duration",
    ])?;
    for workout in workouts {
        for group in &workout.exercises {
            for set in &group.sets {
                writer.write_record([
                    csv_opt(workout.id),
                    workout.date.to_rfc3339(), // Use ISO 8601/RFC3339 for CSV
                    workout.name.clone(),
                    group.exercise_type.clone(),
                    set.set_number.to_string(),
                    csv_opt(set.reps),
                    csv_opt(set.weight),
                    csv_opt(set.duration),
                ])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_workout_detail(workout: &WorkoutRecord, header_color: Color, units: Units) {
    println!(
        "Workout {} '{}' on {} ({} set(s))",
        fmt_opt(workout.id),
        workout.name,
        workout.date.format("%Y-%m-%d %H:%M UTC"),
        workout.total_sets()
    );
    print_groups_table(&workout.exercises, false, header_color, units);
}

fn print_groups_table(groups: &[ExerciseGroup], numbered: bool, header_color: Color, units: Units) {
    let mut headers = vec!["Exercise".to_string()];
    headers.extend(set_headers(units));
    let mut table = new_table(headers, header_color);
    for (i, group) in groups.iter().enumerate() {
        add_group_rows(&mut table, numbered.then_some(i), group);
    }
    println!("{table}");
}

fn print_plan_table(plan: &[ExerciseGroup], header_color: Color, units: Units) {
    println!("Generated plan:");
    print_groups_table(plan, false, header_color, units);
}

fn print_draft_table(draft: &Draft, header_color: Color, units: Units) {
    println!("Draft: {}", draft.name);
    if draft.exercises.is_empty() {
        println!("(no exercises yet, use 'add')");
        return;
    }
    print_groups_table(&draft.exercises, true, header_color, units);
}

fn metric_header(metric: Metric, units: Units) -> String {
    match metric {
        Metric::Reps => "Reps".to_string(),
        Metric::Weight => format!("Weight ({})", units.weight_label()),
        Metric::Duration => "Duration".to_string(),
    }
}

fn print_series_table(series: &Series, metric: Metric, header_color: Color, units: Units) {
    if series.is_placeholder() {
        println!("No data logged for this exercise yet.");
        return;
    }
    let mut table = new_table(
        vec!["Point".to_string(), metric_header(metric, units)],
        header_color,
    );
    for (label, value) in series.points() {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    println!("{table}");
}

fn print_series_csv(series: &Series, metric: Metric) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Label", &metric.to_string()])?;
    for (label, value) in series.points() {
        writer.write_record([label.to_string(), value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accepts_multi_word_types() {
        assert_eq!(
            parse_editor_command("add Bench Press 3 8 60").unwrap(),
            EditorCommand::Add {
                exercise_type: "Bench Press".into(),
                sets: 3,
                reps: Some(8),
                weight: Some(60.0),
                duration: None,
            }
        );
    }

    #[test]
    fn add_dash_skips_a_value() {
        assert_eq!(
            parse_editor_command("add Plank 2 - - 1.5").unwrap(),
            EditorCommand::Add {
                exercise_type: "Plank".into(),
                sets: 2,
                reps: None,
                weight: None,
                duration: Some(1.5),
            }
        );
    }

    #[test]
    fn add_requires_type_and_count() {
        assert!(parse_editor_command("add Squat").is_err());
        assert!(parse_editor_command("add 3").is_err());
        assert!(parse_editor_command("add Squat 3 many").is_err());
    }

    #[test]
    fn set_uses_one_based_indices() {
        assert_eq!(
            parse_editor_command("set 2 1 weight 62.5").unwrap(),
            EditorCommand::Set {
                exercise: 1,
                set: 0,
                metric: Metric::Weight,
                raw: "62.5".into(),
            }
        );
        assert_eq!(
            parse_editor_command("set 1 1 Reps").unwrap(),
            EditorCommand::Set {
                exercise: 0,
                set: 0,
                metric: Metric::Reps,
                raw: String::new(),
            }
        );
        assert!(parse_editor_command("set 0 1 reps 5").is_err());
        assert_eq!(
            parse_editor_command("set 1 1 distance 5").unwrap_err(),
            "unknown field 'distance', expected one of: reps, weight, duration"
        );
        assert_eq!(
            parse_editor_command("set 1 1").unwrap_err(),
            "missing field (reps, weight, duration)"
        );
    }

    #[test]
    fn simple_commands_parse() {
        assert_eq!(parse_editor_command("save").unwrap(), EditorCommand::Save);
        assert_eq!(parse_editor_command("q").unwrap(), EditorCommand::Quit);
        assert_eq!(parse_editor_command("").unwrap(), EditorCommand::Help);
        assert_eq!(
            parse_editor_command("name Push day").unwrap(),
            EditorCommand::Name("Push day".into())
        );
        assert_eq!(
            parse_editor_command("remove 2").unwrap(),
            EditorCommand::Remove { exercise: 1 }
        );
        assert!(parse_editor_command("jump").is_err());
    }
}
