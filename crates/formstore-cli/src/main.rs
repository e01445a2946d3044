// crates/formstore-cli/src/main.rs
// ============================================================================
// Module: Formstore CLI Entry Point
// Description: Command dispatcher for project metadata maintenance.
// Purpose: Migrate, reconcile and inspect a project's forms and instances.
// Dependencies: clap, formstore-config, formstore-core, formstore-store-sqlite
// ============================================================================

//! ## Overview
//! `formstore` loads the TOML config, selects one project and runs a single
//! command against it. Every command opens (and therefore migrates) the
//! project's databases first. Results are written to stdout as one JSON
//! document; failures go to stderr with a non-zero exit code.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use formstore_config::FormStoreConfig;
use formstore_config::ProjectContext;
use formstore_core::ChangeLockProvider;
use formstore_core::DeletionOutcome;
use formstore_core::Form;
use formstore_core::FormDbId;
use formstore_core::FormsRepository;
use formstore_core::Instance;
use formstore_core::InstanceStatus;
use formstore_core::InstancesRepository;
use formstore_core::ReconcileReport;
use formstore_store_sqlite::MigrationReport;
use formstore_store_sqlite::SqliteFormStore;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "formstore", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Config file (overrides `FORMSTORE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Project to operate on; optional when exactly one is configured.
    #[arg(long, value_name = "ID", global = true)]
    project: Option<String>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the project's databases and bring both schemas up to date.
    Migrate,
    /// Reconcile the forms directory with the Forms table.
    Sync,
    /// Form metadata commands.
    Forms {
        /// Selected forms subcommand.
        #[command(subcommand)]
        command: FormsCommand,
    },
    /// Instance metadata commands.
    Instances {
        /// Selected instances subcommand.
        #[command(subcommand)]
        command: InstancesCommand,
    },
}

/// Forms subcommands.
#[derive(Subcommand, Debug)]
enum FormsCommand {
    /// List form rows.
    List(FormsListCommand),
    /// Delete a form row under the deletion policy.
    Delete(FormsDeleteCommand),
}

/// Instances subcommands.
#[derive(Subcommand, Debug)]
enum InstancesCommand {
    /// List instance rows.
    List(InstancesListCommand),
}

/// Arguments for `forms list`.
#[derive(Args, Debug)]
struct FormsListCommand {
    /// Include soft-deleted rows.
    #[arg(long, action = ArgAction::SetTrue)]
    all: bool,
}

/// Arguments for `forms delete`.
#[derive(Args, Debug)]
struct FormsDeleteCommand {
    /// Surrogate key of the form row.
    #[arg(value_name = "ID")]
    id: i64,
}

/// Arguments for `instances list`.
#[derive(Args, Debug)]
struct InstancesListCommand {
    /// Only rows with this status; repeat to accept several.
    #[arg(long = "status", value_enum, value_name = "STATUS")]
    statuses: Vec<StatusArg>,
    /// Include soft-deleted rows.
    #[arg(long, action = ArgAction::SetTrue)]
    all: bool,
}

/// Instance status values accepted on the command line.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum StatusArg {
    /// Still being filled in.
    Incomplete,
    /// Finalized and ready to send.
    Complete,
    /// Accepted by the server.
    Submitted,
    /// Rejected or failed to send.
    SubmissionFailed,
}

impl From<StatusArg> for InstanceStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Incomplete => Self::Incomplete,
            StatusArg::Complete => Self::Complete,
            StatusArg::Submitted => Self::Submitted,
            StatusArg::SubmissionFailed => Self::SubmissionFailed,
        }
    }
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Output of `migrate`.
#[derive(Debug, Serialize)]
struct MigrateOutput<'a> {
    /// Selected project.
    project_id: &'a str,
    /// One report per database.
    migrations: &'a [MigrationReport],
}

/// Output of `sync`.
#[derive(Debug, Serialize)]
struct SyncOutput<'a> {
    /// Selected project.
    project_id: &'a str,
    /// Pass counts.
    report: ReconcileReport,
}

/// Output of `forms delete`.
#[derive(Debug, Serialize)]
struct DeleteOutput<'a> {
    /// Selected project.
    project_id: &'a str,
    /// Targeted surrogate key.
    id: i64,
    /// What the deletion policy did.
    outcome: DeletionOutcome,
}

/// Output of the list commands.
#[derive(Debug, Serialize)]
struct ListOutput<'a, T> {
    /// Selected project.
    project_id: &'a str,
    /// Matching rows.
    rows: Vec<T>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("formstore {version}"))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        return Err(CliError::new("no command given; see --help".to_string()));
    };

    let config = FormStoreConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    let context = config
        .project_context(cli.project.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    let store = context.open_store().map_err(|err| {
        CliError::new(format!("failed to open store for {}: {err}", context.project_id))
    })?;

    match command {
        Commands::Migrate => command_migrate(&context, &store),
        Commands::Sync => command_sync(&context, &store),
        Commands::Forms {
            command,
        } => match command {
            FormsCommand::List(command) => command_forms_list(&context, &store, &command),
            FormsCommand::Delete(command) => command_forms_delete(&context, &store, &command),
        },
        Commands::Instances {
            command: InstancesCommand::List(command),
        } => command_instances_list(&context, &store, &command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `migrate`; opening the store already ran the migrations.
fn command_migrate(context: &ProjectContext, store: &SqliteFormStore) -> CliResult<ExitCode> {
    write_json(&MigrateOutput {
        project_id: context.project_id.as_str(),
        migrations: store.migration_reports(),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `sync`.
fn command_sync(context: &ProjectContext, store: &SqliteFormStore) -> CliResult<ExitCode> {
    let locks = ChangeLockProvider::new();
    let report = context
        .reconciler(store, &locks)
        .synchronize()
        .map_err(|err| CliError::new(format!("sync failed: {err}")))?;
    write_json(&SyncOutput {
        project_id: context.project_id.as_str(),
        report,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `forms list`.
fn command_forms_list(
    context: &ProjectContext,
    store: &SqliteFormStore,
    command: &FormsListCommand,
) -> CliResult<ExitCode> {
    let forms = store.forms();
    let listed = if command.all { forms.get_all() } else { forms.get_all_not_deleted() };
    let rows: Vec<Form> =
        listed.map_err(|err| CliError::new(format!("failed to list forms: {err}")))?;
    write_json(&ListOutput {
        project_id: context.project_id.as_str(),
        rows,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `forms delete`.
///
/// A skipped or missing deletion still prints its outcome but exits non-zero.
fn command_forms_delete(
    context: &ProjectContext,
    store: &SqliteFormStore,
    command: &FormsDeleteCommand,
) -> CliResult<ExitCode> {
    let locks = ChangeLockProvider::new();
    let outcome = context
        .deleter(store, &locks)
        .delete(FormDbId::new(command.id))
        .map_err(|err| CliError::new(format!("delete failed: {err}")))?;
    write_json(&DeleteOutput {
        project_id: context.project_id.as_str(),
        id: command.id,
        outcome,
    })?;
    Ok(deletion_exit_code(outcome))
}

/// Executes `instances list`.
fn command_instances_list(
    context: &ProjectContext,
    store: &SqliteFormStore,
    command: &InstancesListCommand,
) -> CliResult<ExitCode> {
    let instances = store.instances();
    let statuses = selected_statuses(&command.statuses);
    let mut rows: Vec<Instance> = instances
        .get_all_by_status(&statuses)
        .map_err(|err| CliError::new(format!("failed to list instances: {err}")))?;
    if !command.all {
        rows.retain(|instance| !instance.is_deleted());
    }
    write_json(&ListOutput {
        project_id: context.project_id.as_str(),
        rows,
    })?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps status flags to statuses; no flags selects every status.
fn selected_statuses(args: &[StatusArg]) -> Vec<InstanceStatus> {
    if args.is_empty() {
        return InstanceStatus::ALL.to_vec();
    }
    let mut statuses: Vec<InstanceStatus> = Vec::with_capacity(args.len());
    for status in args.iter().copied().map(InstanceStatus::from) {
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    statuses
}

/// Exit code for a deletion outcome.
fn deletion_exit_code(outcome: DeletionOutcome) -> ExitCode {
    match outcome {
        DeletionOutcome::HardDeleted | DeletionOutcome::SoftDeleted => ExitCode::SUCCESS,
        DeletionOutcome::Skipped | DeletionOutcome::NotFound => ExitCode::FAILURE,
    }
}

/// Writes a value to stdout as one line of JSON.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    write_stdout_line(&text)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes an error to stderr and returns the failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "formstore: {message}");
    ExitCode::FAILURE
}
