//! greenova-ob - Obligation tool
//!
//! Command-line front end for the Greenova obligation register: CSV import and
//! export, mechanism status sync, dashboard reports and interactive obligation
//! edits.
//!
//! ```bash
//! greenova-ob import-obligations obligations.csv --project "Portside" --dry-run
//! greenova-ob sync-mechanisms
//! greenova-ob report --project "Portside"
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use greenova_common::config::{load_config, resolve_database_path, ConfigSource, TomlConfig};
use greenova_common::db::init_database;
use greenova_common::models::ProjectRole;
use greenova_common::Status;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::{info, warn};

mod commands;
mod output;

/// Environmental obligation register tool
#[derive(Parser, Debug)]
#[clap(name = "greenova-ob", version)]
#[clap(about = "Import, track and report environmental compliance obligations")]
struct Cli {
    /// Config file (overrides GREENOVA_CONFIG)
    #[clap(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (overrides GREENOVA_DATABASE and the config file)
    #[clap(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import obligations from a CSV file
    ImportObligations(ImportArgs),

    /// Repair stored statuses and recount every mechanism
    SyncMechanisms,

    /// Dashboard summary: completion metrics, mechanisms, overdue count
    Report {
        /// Limit to one project
        #[clap(long)]
        project: Option<String>,

        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },

    /// List obligations past their due date that are not completed
    Overdue {
        #[clap(long)]
        project: Option<String>,

        #[clap(long)]
        json: bool,
    },

    /// List open obligations due within the next N days
    Upcoming {
        #[clap(long)]
        project: Option<String>,

        /// Look-ahead window in days (inclusive)
        #[clap(long, default_value_t = 14)]
        days: u32,

        #[clap(long)]
        json: bool,
    },

    /// Export obligations as CSV in the import layout
    Export(ExportArgs),

    /// Create, edit and remove single obligations
    #[clap(subcommand)]
    Obligation(ObligationCommand),

    /// Projects and memberships
    #[clap(subcommand)]
    Project(ProjectCommand),

    /// Environmental mechanisms
    #[clap(subcommand)]
    Mechanism(MechanismCommand),
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// CSV file to import
    csv_file: PathBuf,

    /// Project for rows with an empty project__name column
    #[clap(long)]
    project: Option<String>,

    /// Overwrite existing obligations instead of skipping them
    #[clap(long)]
    update: bool,

    /// Report what would happen without writing anything
    #[clap(long)]
    dry_run: bool,

    /// Keep going after a failed row (`--continue-on-error=false` stops at the first)
    #[clap(
        long,
        action = ArgAction::Set,
        default_value_t = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    continue_on_error: bool,

    /// Write rows without wrapping each one in a transaction
    #[clap(long)]
    no_transaction: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Output file (stdout if omitted)
    #[clap(long, short, value_name = "FILE")]
    output: Option<PathBuf>,

    #[clap(long)]
    project: Option<String>,

    /// Only obligations with this status
    #[clap(long)]
    status: Option<Status>,

    /// Only obligations with this environmental aspect
    #[clap(long)]
    aspect: Option<String>,

    /// Earliest action due date (YYYY-MM-DD)
    #[clap(long)]
    due_from: Option<NaiveDate>,

    /// Latest action due date (YYYY-MM-DD)
    #[clap(long)]
    due_to: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
enum ObligationCommand {
    /// Create or edit an obligation from a JSON form
    Submit {
        /// JSON file with the obligation fields
        file: PathBuf,
    },

    /// Change an obligation's status
    SetStatus {
        obligation_number: String,

        /// not started, in progress or completed
        status: String,

        /// Close-out date (YYYY-MM-DD); required for completed unless already set
        #[clap(long)]
        close_out_date: Option<NaiveDate>,
    },

    /// Move an obligation to another mechanism of its project
    Reassign {
        obligation_number: String,

        /// Target mechanism; omit to detach
        #[clap(long)]
        mechanism: Option<String>,
    },

    /// Delete an obligation
    Delete { obligation_number: String },
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// List projects
    List,

    /// Create a project
    Create {
        name: String,

        #[clap(long)]
        description: Option<String>,
    },

    /// Add a user to a project or change their role
    AddMember {
        project: String,
        user: String,

        /// owner, manager, member or viewer
        #[clap(long, default_value = "member")]
        role: ProjectRole,
    },

    /// List project members
    Members { project: String },
}

#[derive(Subcommand, Debug)]
enum MechanismCommand {
    /// List mechanisms with their counts
    List {
        #[clap(long)]
        project: Option<String>,
    },

    /// Create a mechanism in a project
    Add { project: String, name: String },
}

/// Shared state for command handlers
pub struct AppContext {
    pub pool: SqlitePool,
    pub config: TomlConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read first so its log level can seed the filter
    let config_result = load_config(cli.config.as_deref());
    let log_level = config_result
        .as_ref()
        .map(|(config, _)| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    info!(
        "Starting Greenova obligation tool (greenova-ob) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let (config, source) = config_result.context("Failed to load configuration")?;
    match &source {
        ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
        ConfigSource::Defaults => warn!("No config file found, using defaults"),
    }

    let db_path = resolve_database_path(cli.database.as_deref(), &config);
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let ctx = AppContext { pool, config };
    let result = commands::run(&ctx, cli.command).await;
    ctx.pool.close().await;
    result
}
