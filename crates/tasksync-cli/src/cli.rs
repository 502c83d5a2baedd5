use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tasksync_core::timestamp;

/// Offline-first task client. Changes made without a connection are queued and
/// replayed once the server is reachable again.
#[derive(Parser, Debug)]
#[command(name = "tasksync", version, propagate_version = true)]
pub struct Cli {
    /// Skip the reachability probe and work from local data only.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show tasks, newest first.
    List {
        /// Reload from the server, dropping any active search.
        #[arg(long)]
        refresh: bool,
        /// Number of pages to load.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        pages: u32,
    },
    /// Search titles and content on the server.
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Create a task.
    Add(TaskFields),
    /// Replace a task's title, content and dates.
    Edit {
        id: String,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Flip a task between open and done.
    Toggle { id: String },
    /// Delete a task.
    Delete { id: String },
    /// Replay queued changes now.
    Sync,
    /// Show changes waiting to be sent.
    Queue,
    /// Stay running: replay on reconnect and fire reminders.
    Watch,
    /// Check storage and server reachability.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub title: String,
    pub content: String,
    /// Due date, e.g. 2025-03-07T18:00 (UTC) or RFC 3339.
    #[arg(long, value_parser = parse_when)]
    pub due: Option<DateTime<Utc>>,
    /// When to be reminded; same formats as --due.
    #[arg(long, value_parser = parse_when)]
    pub remind: Option<DateTime<Utc>>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

fn parse_when(raw: &str) -> Result<DateTime<Utc>, String> {
    timestamp::parse(raw).map_err(|e| format!("expected a date like 2025-03-07T18:00: {e}"))
}
