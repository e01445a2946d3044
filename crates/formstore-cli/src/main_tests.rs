// crates/formstore-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and status selection.
// Purpose: Ensure command lines map onto the intended commands.
// Dependencies: formstore-cli main helpers
// ============================================================================

//! ## Overview
//! Parses representative command lines and checks status flag handling.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use clap::Parser;
use formstore_core::InstanceStatus;

use super::Cli;
use super::Commands;
use super::FormsCommand;
use super::InstancesCommand;
use super::StatusArg;
use super::selected_statuses;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let cli =
        Cli::try_parse_from(["formstore", "sync", "--config", "f.toml", "--project", "demo"])
            .unwrap();
    assert_eq!(cli.config.as_deref(), Some(Path::new("f.toml")));
    assert_eq!(cli.project.as_deref(), Some("demo"));
    assert!(matches!(cli.command, Some(Commands::Sync)));
}

#[test]
fn forms_delete_takes_a_numeric_key() {
    let cli = Cli::try_parse_from(["formstore", "forms", "delete", "12"]).unwrap();
    match cli.command {
        Some(Commands::Forms {
            command: FormsCommand::Delete(command),
        }) => assert_eq!(command.id, 12),
        other => panic!("unexpected command: {other:?}"),
    }
    assert!(Cli::try_parse_from(["formstore", "forms", "delete", "twelve"]).is_err());
}

#[test]
fn instance_status_flags_repeat() {
    let cli = Cli::try_parse_from([
        "formstore",
        "instances",
        "list",
        "--status",
        "complete",
        "--status",
        "submission-failed",
    ])
    .unwrap();
    let Some(Commands::Instances {
        command: InstancesCommand::List(command),
    }) = cli.command
    else {
        panic!("expected instances list");
    };
    assert_eq!(command.statuses, vec![StatusArg::Complete, StatusArg::SubmissionFailed]);
    assert!(!command.all);
    assert!(Cli::try_parse_from(["formstore", "instances", "list", "--status", "sent"]).is_err());
}

#[test]
fn no_status_flags_select_every_status() {
    assert_eq!(selected_statuses(&[]), InstanceStatus::ALL.to_vec());
    let repeated = [StatusArg::Complete, StatusArg::Complete, StatusArg::Incomplete];
    assert_eq!(
        selected_statuses(&repeated),
        vec![InstanceStatus::Complete, InstanceStatus::Incomplete]
    );
}
