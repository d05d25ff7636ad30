//! TaskRank CLI: personal tasks ranked by weighted priority categories.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskrank::app::AppState;
use taskrank::database::{
    Category, CategoryPatch, NewCategory, NewTask, RepeatInterval, Task, TaskQuery, TaskStatus,
    TaskType,
};
use taskrank::priority::{PriorityRatings, Rating};
use taskrank::services::{ExportBundle, ImportMode, RescoreScope};

#[derive(Parser)]
#[command(name = "taskrank", version, about = "Tasks ranked by weighted priority categories")]
struct Cli {
    /// Data directory for the database, settings and backups.
    #[arg(long, global = true, env = "TASKRANK_DATA_DIR", default_value = "taskrank-data")]
    data_dir: PathBuf,

    /// Act as this owner instead of the configured default.
    #[arg(long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and seed the default categories.
    Init,

    /// Manage priority categories.
    Categories {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Manage tasks.
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Export the owner's categories and tasks as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import categories and tasks from a JSON file.
    Import {
        file: PathBuf,

        /// The file is a task list from the old browser frontend.
        #[arg(long)]
        legacy: bool,

        /// Delete the owner's tasks before importing.
        #[arg(long)]
        replace: bool,
    },

    /// Create, list and restore backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Show or change settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    /// List the categories in scope with their weights.
    List,
    /// Add a category.
    Add {
        id: String,
        /// Display name.
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "0")]
        weight: u32,
        #[arg(long, default_value = "#808080")]
        color: String,
        /// Alternate-language label.
        #[arg(long)]
        secondary_name: Option<String>,
        /// Add as a global default instead of an owner category.
        #[arg(long)]
        default: bool,
    },
    /// Set one or more weights, e.g. `impact=30 risk=0`.
    SetWeight {
        #[arg(required = true, value_parser = parse_key_value::<u32>)]
        weights: Vec<(String, u32)>,
    },
    /// Rename or recolor a category.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        secondary_name: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a category no task rates.
    Delete { id: String },
    /// Restore the canonical default categories.
    Reset,
    /// Report the weight total of every scope.
    Validate,
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a task.
    Add {
        title: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "type", default_value = "personal")]
        task_type: TaskType,
        #[arg(long, default_value = "not_started")]
        status: TaskStatus,
        /// Due date, YYYY-MM-DD.
        #[arg(long)]
        due: Option<NaiveDate>,
        /// Repeat interval; makes the task repeating.
        #[arg(long)]
        repeat: Option<RepeatInterval>,
        #[arg(long)]
        link: Option<String>,
        /// Category rating, repeatable: `--rate impact=4`.
        #[arg(long = "rate", value_parser = parse_key_value::<i64>)]
        ratings: Vec<(String, i64)>,
    },
    /// List tasks, highest priority first.
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long = "type")]
        task_type: Option<TaskType>,
        /// Match title, goal or notes.
        #[arg(long)]
        search: Option<String>,
        /// Include completed tasks even if settings hide them.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a task and how its score is made up.
    Show { id: String },
    /// Rate a task in one category.
    Rate {
        id: String,
        category: String,
        rating: i64,
    },
    /// Change a task's status.
    Status { id: String, status: TaskStatus },
    /// Delete a task.
    Delete { id: String },
    /// Recompute stored scores, e.g. after due dates moved closer.
    Rescore,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Create a backup now.
    Create,
    /// List recorded backups.
    List,
    /// Replace all data with a backup's contents.
    Restore { path: PathBuf },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings.
    Show,
    /// Change one or more settings.
    Set {
        /// Owner used when --owner is not given.
        #[arg(long, conflicts_with = "clear_default_owner")]
        default_owner: Option<String>,
        /// Act without an owner unless --owner is given.
        #[arg(long)]
        clear_default_owner: bool,
        /// Leave completed tasks out of `tasks list`.
        #[arg(long)]
        hide_completed: Option<bool>,
        /// Default number of tasks `tasks list` prints.
        #[arg(long)]
        list_limit: Option<usize>,
        /// Number of backup files to keep.
        #[arg(long)]
        retention: Option<usize>,
        /// Directory for backups; takes effect on the next run.
        #[arg(long)]
        backup_location: Option<PathBuf>,
    },
}

fn parse_key_value<T>(s: &str) -> std::result::Result<(String, T), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {}: {}", key, e))?;
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskrank=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let state = AppState::initialize(&cli.data_dir)
        .await
        .with_context(|| format!("failed to open data directory {:?}", cli.data_dir))?;
    let owner = state.resolve_owner(cli.owner);
    let owner = owner.as_deref();

    match cli.command {
        Commands::Init => {
            println!("Data directory ready at {}", state.data_dir.display());
            print_categories(&state.categories.list_for_owner(owner).await?);
        }

        Commands::Categories { action } => run_categories(&state, owner, action).await?,

        Commands::Tasks { action } => run_tasks(&state, owner, action).await?,

        Commands::Export { output } => {
            let json = state.transfer.export_json(owner).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {:?}", path))?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Import {
            file,
            legacy,
            replace,
        } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {:?}", file))?;
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::Merge
            };
            let report = if legacy {
                state.transfer.import_legacy(owner, &json, mode).await?
            } else {
                let bundle = ExportBundle::from_json(&json)?;
                state.transfer.import_bundle(owner, bundle, mode).await?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Backup { action } => match action {
            BackupAction::Create => {
                let path = state.backup.create_backup().await?;
                println!("Backup written to {}", path.display());
            }
            BackupAction::List => {
                for backup in state.backup.list_backups().await? {
                    println!(
                        "{}  {:>10} bytes  {}",
                        backup.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        backup.size,
                        backup.path
                    );
                }
            }
            BackupAction::Restore { path } => {
                let summary = state.backup.restore_backup(&path).await?;
                println!(
                    "Restored {} categories and {} tasks",
                    summary.categories, summary.tasks
                );
            }
        },

        Commands::Settings { action } => run_settings(&state, action).await?,
    }

    Ok(())
}

async fn run_categories(
    state: &AppState,
    owner: Option<&str>,
    action: CategoryAction,
) -> Result<()> {
    match action {
        CategoryAction::List => {
            print_categories(&state.categories.list_for_owner(owner).await?);
        }
        CategoryAction::Add {
            id,
            name,
            weight,
            color,
            secondary_name,
            default,
        } => {
            let scope = if default { None } else { owner };
            let category = state
                .categories
                .create(
                    scope,
                    NewCategory {
                        id,
                        display_name: name,
                        secondary_name,
                        weight,
                        color,
                        is_default: default,
                    },
                )
                .await?;
            println!("Added {} ({}%)", category.id, category.weight);
        }
        CategoryAction::SetWeight { weights } => {
            let weights: BTreeMap<String, u32> = weights.into_iter().collect();
            let outcome = state.categories.bulk_set_weights(owner, weights).await?;
            println!(
                "Updated {}; scope total now {}%",
                outcome.updated.join(", "),
                outcome.total_weight
            );
            if !outcome.skipped.is_empty() {
                println!("Unknown categories skipped: {}", outcome.skipped.join(", "));
            }
        }
        CategoryAction::Edit {
            id,
            name,
            secondary_name,
            color,
        } => {
            let patch = CategoryPatch {
                display_name: name,
                secondary_name,
                color,
                ..CategoryPatch::default()
            };
            let category = state.categories.update(owner, &id, patch).await?;
            println!("Updated {}", category.id);
        }
        CategoryAction::Delete { id } => {
            state.categories.delete(owner, &id).await?;
            println!("Deleted {}", id);
        }
        CategoryAction::Reset => {
            let count = state.categories.reset_defaults().await?;
            println!("Reset {} default categories", count);
        }
        CategoryAction::Validate => {
            for report in state.categories.validate_weights().await? {
                println!(
                    "{:<20} {:>4}%  {}",
                    report.owner_id.as_deref().unwrap_or("(defaults)"),
                    report.total_weight,
                    if report.ok { "ok" } else { "OVER LIMIT" }
                );
            }
        }
    }
    Ok(())
}

async fn run_settings(state: &AppState, action: SettingsAction) -> Result<()> {
    let service = &state.settings_service;
    match action {
        SettingsAction::Show => {
            let settings = service.load().await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Set {
            default_owner,
            clear_default_owner,
            hide_completed,
            list_limit,
            retention,
            backup_location,
        } => {
            if clear_default_owner {
                service.set_default_owner(None).await?;
            } else if let Some(owner) = default_owner {
                service.set_default_owner(Some(owner)).await?;
            }

            if hide_completed.is_some() || list_limit.is_some() {
                let mut tasks = service.get_task_list().await?;
                if let Some(hide) = hide_completed {
                    tasks.hide_completed = hide;
                }
                if let Some(limit) = list_limit {
                    tasks.list_limit = limit;
                }
                service.update_task_list(tasks).await?;
            }

            if retention.is_some() || backup_location.is_some() {
                let mut backup = service.get_backup().await?;
                if let Some(count) = retention {
                    backup.retention_count = count;
                }
                if let Some(location) = backup_location {
                    backup.location = Some(location.to_string_lossy().into_owned());
                }
                service.update_backup(backup).await?;
            }

            println!("{}", serde_json::to_string_pretty(&service.load().await?)?);
        }
    }
    Ok(())
}

async fn run_tasks(state: &AppState, owner: Option<&str>, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Add {
            title,
            project,
            goal,
            notes,
            task_type,
            status,
            due,
            repeat,
            link,
            ratings,
        } => {
            let mut priority_ratings = PriorityRatings::new();
            for (category, value) in ratings {
                priority_ratings.set(category, Rating::new(value)?)?;
            }
            let task = state
                .tasks
                .create_task(
                    owner,
                    NewTask {
                        title,
                        project,
                        goal,
                        notes,
                        task_type,
                        status,
                        due_date: due,
                        is_repeating: repeat.is_some(),
                        repeat_interval: repeat,
                        link,
                        priority_ratings,
                    },
                )
                .await?;
            println!("Added {} (score {:.1})", task.id, task.priority_score);
        }
        TaskAction::List {
            project,
            status,
            task_type,
            search,
            all,
            limit,
        } => {
            let query = TaskQuery {
                owner_id: owner.map(str::to_string),
                project,
                status,
                task_type,
                search,
                include_completed: all || !state.settings.tasks.hide_completed,
                limit: Some(limit.unwrap_or(state.settings.tasks.list_limit)),
            };
            print_tasks(&state.tasks.list_tasks(&query).await?);
        }
        TaskAction::Show { id } => {
            let task = state.tasks.get_task(&id).await?;
            let breakdown = state.tasks.explain_score(&id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
        }
        TaskAction::Rate {
            id,
            category,
            rating,
        } => {
            let task = state
                .tasks
                .rate_task(&id, &category, Rating::new(rating)?)
                .await?;
            println!("{} now scores {:.1}", task.id, task.priority_score);
        }
        TaskAction::Status { id, status } => {
            let task = state.tasks.set_status(&id, status).await?;
            println!("{} is {}", task.id, task.status);
        }
        TaskAction::Delete { id } => {
            state.tasks.delete_task(&id).await?;
            println!("Deleted {}", id);
        }
        TaskAction::Rescore => {
            let changed = state.tasks.rescore(RescoreScope::All).await?;
            println!("{} scores changed", changed);
        }
    }
    Ok(())
}

fn print_categories(categories: &[Category]) {
    for c in categories {
        println!(
            "{:<16} {:>4}%  {:<8} {}{}",
            c.id,
            c.weight,
            c.color,
            c.display_name,
            if c.is_default { "" } else { "  (custom)" }
        );
    }
    let total: u32 = categories.iter().map(|c| c.weight).sum();
    println!("{:<16} {:>4}%", "total", total);
}

fn print_tasks(tasks: &[Task]) {
    for t in tasks {
        println!(
            "{:>6.1}  {:<12} {:<10} {}  [{}]",
            t.priority_score,
            t.status.as_str(),
            t.due_date.map(|d| d.to_string()).unwrap_or_default(),
            t.title,
            t.id
        );
    }
}
