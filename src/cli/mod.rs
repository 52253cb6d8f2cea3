pub mod onboard;

use crate::db::FilterMode;
use crate::export::ExportLayout;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tasker", about = "Task time tracker with tags, filters and CSV export")]
pub struct Cli {
    /// Database file, overriding the configured `db_path`.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Interactive setup of the config file and database.
    Init {
        #[arg(long, default_value_t = false)]
        defaults: bool,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Task list, narrowed by the stored filter unless `--all` is given.
    List {
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    Open {
        task: String,
    },
    Close {
        task: String,
    },
    Start {
        task: String,
    },
    Stop {
        task: String,
    },
    /// Log a timestamp on a running timer.
    Mark {
        task: String,
        #[arg(long)]
        comment: Option<String>,
    },
    Timestamps {
        #[command(subcommand)]
        command: TimestampCommands,
    },
    Filter {
        #[command(subcommand)]
        command: FilterCommands,
    },
    /// Write tasks to CSV. Without task arguments the filtered list is exported.
    Export {
        tasks: Vec<String>,
        #[arg(long, value_enum, default_value_t = ExportLayout::ByTask)]
        layout: ExportLayout,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Option {
        #[command(subcommand)]
        command: OptionCommands,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
    /// Close idle open tasks unless the `preserve_tasks` option is set.
    Reset,
    Doctor {
        /// Remove rows left behind by interrupted deletes.
        #[arg(long, default_value_t = false)]
        fix: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    Add { name: String },
    Show { task: String },
    Rename { task: String, name: String },
    /// Set the description; omit the text to clear it.
    Describe { task: String, text: Option<String> },
    Delete {
        #[arg(required = true)]
        tasks: Vec<String>,
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
    Tags { task: String },
}

#[derive(Debug, Subcommand)]
pub enum TagCommands {
    Add { name: String },
    List,
    Delete {
        #[arg(required = true)]
        tags: Vec<String>,
    },
    Assign { task: String, tag: String },
    Unassign { task: String, tag: String },
}

#[derive(Debug, Subcommand)]
pub enum TimestampCommands {
    List { task: String },
    Delete { task: String, timestamp: i64 },
}

#[derive(Debug, Subcommand)]
pub enum FilterCommands {
    Set {
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "date")]
        dates: Vec<String>,
        #[arg(long)]
        mode: Option<FilterMode>,
    },
    Show,
    Clear,
    /// Dates with recorded activity, newest first.
    Dates,
}

#[derive(Debug, Subcommand)]
pub enum OptionCommands {
    Get { name: String },
    Set { name: String, value: String },
    List,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}
