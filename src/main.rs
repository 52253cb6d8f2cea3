mod cli;
mod config;
mod db;
mod export;
mod timefmt;
mod tracker;

use crate::cli::onboard::{confirm_deletion, run_onboarding};
use crate::cli::{
    Cli, Commands, ConfigCommands, FilterCommands, OptionCommands, TagCommands, TaskCommands,
    TimestampCommands,
};
use crate::config::Config;
use crate::db::patches::{PATCHES, latest_version};
use crate::db::{Database, FilterSelection};
use crate::export::ExportLayout;
use crate::timefmt::{format_date, format_duration, human_datetime, parse_date};
use crate::tracker::Tracker;
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime};
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Commands::Init { defaults } = cli.command {
        let _ = run_onboarding(defaults)?;
        return Ok(());
    }
    if let Commands::Config { command } = cli.command {
        return handle_config_command(command);
    }

    let config = Config::load_or_default()?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());
    debug!(db_path = %db_path.display(), "opening database");
    let database = Database::open(&db_path)?;

    match cli.command {
        Commands::Task { command } => handle_task_command(&database, &config, command),
        Commands::Tag { command } => handle_tag_command(&database, command),
        Commands::List { all } => handle_list(&database, all),
        Commands::Open { task } => {
            let task_id = resolve_task(&database, &task)?;
            Tracker::load(&database)?.open_task(task_id)?;
            println!("Task {task_id} opened");
            Ok(())
        }
        Commands::Close { task } => {
            let task_id = resolve_task(&database, &task)?;
            Tracker::load(&database)?.close_task(task_id)?;
            println!("Task {task_id} closed");
            Ok(())
        }
        Commands::Start { task } => handle_start(&database, &task),
        Commands::Stop { task } => handle_stop(&database, &task),
        Commands::Mark { task, comment } => {
            let task_id = resolve_task(&database, &task)?;
            let elapsed = Tracker::load(&database)?.mark(task_id, now(), comment.as_deref())?;
            println!("Timestamp logged at {}", format_duration(elapsed));
            Ok(())
        }
        Commands::Timestamps { command } => handle_timestamps_command(&database, command),
        Commands::Filter { command } => handle_filter_command(&database, &config, command),
        Commands::Export {
            tasks,
            layout,
            output,
        } => handle_export(&database, &config, &tasks, layout, output),
        Commands::Option { command } => handle_option_command(&database, command),
        Commands::Status => handle_status(&database, &db_path),
        Commands::Reset => {
            let mut tracker = Tracker::load(&database)?;
            tracker.reset_session()?;
            println!("Open tasks: {}", tracker.open_tasks().len());
            Ok(())
        }
        Commands::Doctor { fix } => handle_doctor(&database, fix),
        Commands::Init { .. } | Commands::Config { .. } => Ok(()),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load_or_default()?;
            config.set_value(&key, &value)?;
            config.save()?;
            println!("Config saved: {key} = {value}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = Config::load_or_default()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_task_command(database: &Database, config: &Config, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Add { name } => {
            let task_id = database.insert_task(&name, now())?;
            println!("Task created: {} (id {task_id})", name.trim());
            Ok(())
        }
        TaskCommands::Show { task } => {
            let task_id = resolve_task(database, &task)?;
            let details = database.select_task(task_id, now().date())?;
            let tags = database
                .tag_states(task_id)?
                .into_iter()
                .filter(|state| state.assigned)
                .map(|state| state.name)
                .collect::<Vec<_>>();

            println!("Task {}: {}", details.id, details.name);
            println!("- created: {}", human_datetime(&details.creation_date));
            println!(
                "- description: {}",
                details.description.as_deref().unwrap_or("none")
            );
            println!("- tags: {}", tags.join(", "));
            println!("- spent today: {}", format_duration(details.spent_today));
            println!("- spent total: {}", format_duration(details.spent_total));
            for (date, seconds) in database.task_activity(task_id)? {
                println!("  {date}  {}", format_duration(seconds));
            }
            Ok(())
        }
        TaskCommands::Rename { task, name } => {
            let task_id = resolve_task(database, &task)?;
            database.rename_task(task_id, &name)?;
            println!("Task {task_id} renamed to {}", name.trim());
            Ok(())
        }
        TaskCommands::Describe { task, text } => {
            let task_id = resolve_task(database, &task)?;
            database.set_description(task_id, text.as_deref())?;
            println!("Description of task {task_id} updated");
            Ok(())
        }
        TaskCommands::Delete { tasks, yes } => {
            let ids = tasks
                .iter()
                .map(|task| resolve_task(database, task))
                .collect::<Result<Vec<_>>>()?;
            let today = now().date();
            let names = ids
                .iter()
                .map(|task_id| database.select_task(*task_id, today).map(|task| task.name))
                .collect::<Result<Vec<_>, _>>()?;

            if !yes && !confirm_deletion(config, &names)? {
                println!("Nothing deleted");
                return Ok(());
            }

            database.delete_tasks(&ids)?;
            Tracker::load(database)?.forget(&ids)?;
            println!("Deleted: {}", names.join(", "));
            Ok(())
        }
        TaskCommands::Tags { task } => {
            let task_id = resolve_task(database, &task)?;
            for state in database.tag_states(task_id)? {
                println!(
                    "[{}] {} {}",
                    if state.assigned { "x" } else { " " },
                    state.id,
                    state.name
                );
            }
            Ok(())
        }
    }
}

fn handle_tag_command(database: &Database, command: TagCommands) -> Result<()> {
    match command {
        TagCommands::Add { name } => {
            let tag_id = database.insert_tag(&name)?;
            println!("Tag created: {} (id {tag_id})", name.trim());
            Ok(())
        }
        TagCommands::List => {
            for tag in database.tags()? {
                println!("{}\t{}", tag.id, tag.name);
            }
            Ok(())
        }
        TagCommands::Delete { tags } => {
            let ids = tags
                .iter()
                .map(|tag| resolve_tag(database, tag))
                .collect::<Result<Vec<_>>>()?;
            database.delete_tags(&ids)?;
            println!("Deleted {} tag(s)", ids.len());
            Ok(())
        }
        TagCommands::Assign { task, tag } => {
            let task_id = resolve_task(database, &task)?;
            let tag_id = resolve_tag(database, &tag)?;
            if database.assign_tag(task_id, tag_id)? {
                println!("Tag {tag} assigned to task {task_id}");
            } else {
                println!("Task {task_id} already has tag {tag}");
            }
            Ok(())
        }
        TagCommands::Unassign { task, tag } => {
            let task_id = resolve_task(database, &task)?;
            let tag_id = resolve_tag(database, &tag)?;
            if database.unassign_tag(task_id, tag_id)? {
                println!("Tag {tag} removed from task {task_id}");
            } else {
                println!("Task {task_id} does not have tag {tag}");
            }
            Ok(())
        }
    }
}

fn handle_list(database: &Database, all: bool) -> Result<()> {
    let selection = if all {
        FilterSelection::default()
    } else {
        database.load_filter()?
    };

    if !selection.is_empty() {
        println!("Filter: {}", describe_filter(database, &selection)?);
    }

    let rows = database.filtered_tasks(&selection)?;
    if rows.is_empty() {
        println!("No tasks");
        return Ok(());
    }

    for row in rows {
        println!(
            "{:>4}  {:<32}  {:>16}  {}",
            row.id,
            row.name,
            format_duration(row.total_time),
            human_datetime(&row.creation_date)
        );
    }
    Ok(())
}

fn handle_start(database: &Database, task: &str) -> Result<()> {
    let task_id = resolve_task(database, task)?;
    let mut tracker = Tracker::load(database)?;
    tracker.start(task_id, now())?;
    println!("Timer started for task {task_id}");
    Ok(())
}

fn handle_stop(database: &Database, task: &str) -> Result<()> {
    let task_id = resolve_task(database, task)?;
    let mut tracker = Tracker::load(database)?;
    let summary = tracker.stop(task_id, now())?;

    println!(
        "Timer stopped for task {}: {} this session, {} total",
        summary.task_id,
        format_duration(summary.session_seconds),
        format_duration(summary.total_seconds)
    );
    if let Some(rollover) = summary.rollover {
        println!(
            "- {} counted on {}",
            format_duration(rollover.carried_over),
            format_date(rollover.current_date)
        );
    }
    Ok(())
}

fn handle_timestamps_command(database: &Database, command: TimestampCommands) -> Result<()> {
    match command {
        TimestampCommands::List { task } => {
            let task_id = resolve_task(database, &task)?;
            let current = now();
            let total = match Tracker::load(database)?.elapsed_total(task_id, current) {
                Some(total) => total,
                None => database.select_task(task_id, current.date())?.spent_total,
            };

            let entries = database.timestamps(task_id, total)?;
            if entries.is_empty() {
                println!("No timestamps");
            }
            for entry in entries {
                println!(
                    "{:>8}  {:<6}  {}{}",
                    entry.timestamp,
                    entry.event.map(|event| event.label()).unwrap_or("-"),
                    entry.label,
                    entry
                        .comment
                        .map(|comment| format!(" ({comment})"))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        TimestampCommands::Delete { task, timestamp } => {
            let task_id = resolve_task(database, &task)?;
            let removed = database.delete_timestamp(task_id, timestamp)?;
            println!("Removed {removed} timestamp(s)");
            Ok(())
        }
    }
}

fn handle_filter_command(
    database: &Database,
    config: &Config,
    command: FilterCommands,
) -> Result<()> {
    match command {
        FilterCommands::Set { tags, dates, mode } => {
            let tags = tags
                .iter()
                .map(|tag| resolve_tag(database, tag))
                .collect::<Result<_>>()?;
            let dates = dates
                .iter()
                .map(|date| parse_date(date).map(format_date))
                .collect::<Result<_>>()?;
            let selection = FilterSelection {
                tags,
                dates,
                mode: mode.unwrap_or(config.default_filter_mode),
            };

            database.save_filter(&selection)?;
            println!("Filter saved: {}", describe_filter(database, &selection)?);
            Ok(())
        }
        FilterCommands::Show => {
            let selection = database.load_filter()?;
            if selection.is_empty() {
                println!("No filter (mode {})", selection.mode);
            } else {
                println!("{}", describe_filter(database, &selection)?);
            }
            Ok(())
        }
        FilterCommands::Clear => {
            let mode = database.load_filter()?.mode;
            database.save_filter(&FilterSelection {
                mode,
                ..FilterSelection::default()
            })?;
            println!("Filter cleared");
            Ok(())
        }
        FilterCommands::Dates => {
            for date in database.activity_dates()? {
                println!("{date}");
            }
            Ok(())
        }
    }
}

fn handle_export(
    database: &Database,
    config: &Config,
    tasks: &[String],
    layout: ExportLayout,
    output: Option<PathBuf>,
) -> Result<()> {
    let ids = if tasks.is_empty() {
        database
            .filtered_tasks(&database.load_filter()?)?
            .into_iter()
            .map(|row| row.id)
            .collect::<Vec<_>>()
    } else {
        tasks
            .iter()
            .map(|task| resolve_task(database, task))
            .collect::<Result<Vec<_>>>()?
    };

    if ids.is_empty() {
        bail!("No tasks to export");
    }

    let rows = database.export_rows(&ids)?;
    let lines = export::render(layout, &rows);
    let path = output.unwrap_or_else(|| {
        config
            .export_dir
            .join(format!("tasker-{}.csv", format_date(now().date())))
    });

    export::write_export(&path, &lines)?;
    println!(
        "Exported {} task(s) to {}",
        ids.len(),
        path.display()
    );
    Ok(())
}

fn handle_option_command(database: &Database, command: OptionCommands) -> Result<()> {
    match command {
        OptionCommands::Get { name } => {
            let value = database
                .option(&name)?
                .with_context(|| format!("Option not set: {name}"))?;
            println!("{value}");
            Ok(())
        }
        OptionCommands::Set { name, value } => {
            database.set_option(&name, &value)?;
            println!("Option saved: {name} = {value}");
            Ok(())
        }
        OptionCommands::List => {
            for (name, value) in database.options()? {
                println!("{name} = {value}");
            }
            Ok(())
        }
    }
}

fn handle_status(database: &Database, db_path: &std::path::Path) -> Result<()> {
    let tracker = Tracker::load(database)?;
    let current = now();

    println!("tasker status");
    println!("- database: {}", db_path.display());
    println!(
        "- patch_version: {} (latest {})",
        database.patch_version()?.unwrap_or_default(),
        latest_version(PATCHES)
    );
    println!("- tasks: {}", database.all_tasks()?.len());
    println!(
        "- open_tasks: {}/{}",
        tracker.open_tasks().len(),
        tracker.capacity()
    );
    for task_id in tracker.open_tasks() {
        let details = database.select_task(*task_id, current.date())?;
        let state = tracker
            .elapsed_total(*task_id, current)
            .map(|total| format!("running, {} total", format_duration(total)))
            .unwrap_or_else(|| format!("idle, {} total", format_duration(details.spent_total)));
        println!("  {} {} ({state})", details.id, details.name);
    }

    let selection = database.load_filter()?;
    println!(
        "- filter: {}",
        if selection.is_empty() {
            "none".to_string()
        } else {
            describe_filter(database, &selection)?
        }
    );

    Ok(())
}

fn handle_doctor(database: &Database, fix: bool) -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!(
            "[OK] config.json not found, using defaults: {}",
            config_path.display()
        );
    }

    let stored = database.patch_version()?.unwrap_or_default();
    let latest = latest_version(PATCHES);
    if stored >= latest {
        println!("[OK] schema patched to version {stored}");
    } else {
        println!("[WARN] schema at version {stored}, latest is {latest}");
        issues.push("schema behind");
    }

    let orphans = database.orphan_counts()?;
    if orphans.total() == 0 {
        println!("[OK] no orphaned rows");
    } else {
        println!(
            "[WARN] orphaned rows: activity={}, tags={}, timestamps={}",
            orphans.activity, orphans.tags, orphans.timestamps
        );
        if fix {
            let removed = database.prune_orphans()?;
            println!("[OK] removed {removed} orphaned row(s)");
        } else {
            issues.push("orphaned rows");
        }
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

fn describe_filter(database: &Database, selection: &FilterSelection) -> Result<String> {
    let tag_names = database
        .tags()?
        .into_iter()
        .filter(|tag| selection.tags.contains(&tag.id))
        .map(|tag| tag.name)
        .collect::<Vec<_>>();
    let dates = selection.dates.iter().cloned().collect::<Vec<_>>();

    Ok(format!(
        "mode {}; tags [{}]; dates [{}]",
        selection.mode,
        tag_names.join(", "),
        dates.join(", ")
    ))
}

fn resolve_task(database: &Database, reference: &str) -> Result<i64> {
    database
        .resolve_task(reference)?
        .with_context(|| format!("Task not found: {reference}"))
}

fn resolve_tag(database: &Database, reference: &str) -> Result<i64> {
    database
        .resolve_tag(reference)?
        .with_context(|| format!("Tag not found: {reference}"))
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
