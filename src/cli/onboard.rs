use crate::config::{Config, expand_home};
use crate::db::{Database, FilterMode};
use crate::tracker::Tracker;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};

pub fn run_onboarding(use_defaults: bool) -> Result<Config> {
    if use_defaults {
        let config = Config::default();
        config.save()?;
        let database = Database::open(&config.db_path)?;
    Tracker::load(&database)?.reset_session()?;
        Tracker::load(&database)?.reset_session()?;
        println!("Config saved with defaults: {}", Config::config_path()?.display());
        return Ok(config);
    }

    println!("──────────────────────────────────────────");
    println!("  Welcome to tasker setup.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();

    println!("\n[1/4] Database file");
    let db_input: String = Input::with_theme(&theme)
        .with_prompt("  Where should tasks be stored?")
        .default(Config::default().db_path.display().to_string())
        .interact_text()
        .context("Failed to read database path")?;
    let db_path = expand_home(&db_input);
    println!("  ✓ {}", db_path.display());

    println!("\n[2/4] Export directory");
    let export_input: String = Input::with_theme(&theme)
        .with_prompt("  Folder for CSV exports")
        .default(".".to_string())
        .interact_text()
        .context("Failed to read export directory")?;
    let export_dir = expand_home(&export_input);
    println!("  ✓ {}", export_dir.display());

    println!("\n[3/4] Default filter mode");
    let modes = [FilterMode::And, FilterMode::Or];
    let selected = Select::with_theme(&theme)
        .with_prompt("  Combine selected tags and dates with")
        .default(0)
        .items(&modes.iter().map(ToString::to_string).collect::<Vec<_>>())
        .interact()
        .context("Failed to select filter mode")?;
    let default_filter_mode = modes.get(selected).copied().unwrap_or_default();
    println!("  ✓ {default_filter_mode}");

    println!("\n[4/4] Deletion safety");
    let confirm_delete = Confirm::with_theme(&theme)
        .with_prompt("  Ask before deleting tasks?")
        .default(true)
        .interact()
        .context("Failed to read deletion confirmation input")?;

    let config = Config {
        db_path,
        export_dir,
        default_filter_mode,
        confirm_delete,
    };

    config.save()?;
    let database = Database::open(&config.db_path)?;

    println!("\n──────────────────────────────────────────");
    println!("  Setup complete!");
    println!(
        "  Database ready at patch level {}.",
        database.patch_version()?.unwrap_or_default()
    );
    println!("  Run `tasker task add <name>` to create a task.");
    println!("──────────────────────────────────────────");

    Ok(config)
}

/// Asks before deleting tasks, unless the config turned that off.
pub fn confirm_deletion(config: &Config, names: &[String]) -> Result<bool> {
    if !config.confirm_delete {
        return Ok(true);
    }

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Delete {} and all of its recorded time? ({})",
            if names.len() == 1 { "this task" } else { "these tasks" },
            names.join(", ")
        ))
        .default(false)
        .interact()
        .context("Failed to read deletion confirmation input")
}
