use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "lookervault", version, about = "Back up and restore a Looker instance's content")]
pub struct Cli {
    /// Path to a lookervault.toml config file. Defaults to `LOOKERVAULT_CONFIG`
    /// if set, otherwise built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull content from the source Looker instance into the local store.
    Extract(ExtractArgs),
    /// Push content from the local store into a destination Looker instance.
    Restore(RestoreArgs),
    /// Manage content-store snapshots on durable storage.
    Snapshot(SnapshotArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Comma-separated content types; omit to extract all supported types.
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<i64>,
    #[arg(long = "folder-id")]
    pub folder_ids: Vec<i64>,
    #[arg(long)]
    pub recursive_folders: bool,
    #[arg(long)]
    pub incremental: bool,
    #[arg(long)]
    pub updated_after: Option<DateTime<Utc>>,
    #[arg(long, value_delimiter = ',')]
    pub fields: Option<Vec<String>>,
    #[arg(long, overrides_with = "no_resume")]
    pub resume: bool,
    #[arg(long, overrides_with = "resume")]
    pub no_resume: bool,
    #[arg(long)]
    pub rate_limit_per_minute: Option<u32>,
    #[arg(long)]
    pub rate_limit_per_second: Option<u32>,
    #[arg(long = "db")]
    pub db_path: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Content types to restore; omit to restore all types present locally.
    pub types: Vec<String>,
    #[arg(long)]
    pub from_snapshot: Option<String>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub rate_limit_per_minute: Option<u32>,
    #[arg(long)]
    pub rate_limit_per_second: Option<u32>,
    #[arg(long)]
    pub checkpoint_interval: Option<u64>,
    #[arg(long)]
    pub max_retries: Option<u32>,
    #[arg(long)]
    pub skip_if_modified: bool,
    #[arg(long)]
    pub dry_run: bool,
    /// Skip the confirmation prompt before writing to the destination.
    #[arg(long)]
    pub force: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub action: Option<RestoreAction>,
}

#[derive(Subcommand, Debug)]
pub enum RestoreAction {
    /// Resumes the most recent incomplete restoration, or a named session.
    Resume { session_id: Option<Uuid> },
    /// Inspects and replays permanently-failed restore items.
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    /// Reports the status of past restoration sessions.
    Status {
        session_id: Option<Uuid>,
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum DlqAction {
    List {
        #[arg(long)]
        content_type: Option<String>,
    },
    Show { id: i64 },
    Retry { id: i64 },
    Clear {
        #[arg(long)]
        content_type: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub action: SnapshotAction,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotAction {
    Upload {
        #[arg(long, default_value = "lookervault")]
        prefix: String,
        #[arg(long)]
        gzip: bool,
    },
    List {
        #[arg(long, default_value = "lookervault")]
        prefix: String,
    },
    Download {
        reference: String,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    Delete {
        reference: String,
    },
    /// Deletes snapshots older than the configured retention period.
    Cleanup {
        #[arg(long, default_value = "lookervault")]
        prefix: String,
    },
}
