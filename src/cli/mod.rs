//! CLI argument parsing for tasklock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tasklock::record::TaskType;

/// Default directory of the file-backed lock store.
pub const DEFAULT_STORE_DIR: &str = ".tasklock";

/// Tasklock: lease-based exclusive locks for background tasks.
///
/// Locks are kept in a file-backed store shared by every process that
/// points at the same directory:
/// - a lock covers one resource and one task type
/// - a lock expires unless its holder renews it
/// - every acquisition attempt uses its own lock id (see `new-id`)
#[derive(Parser, Debug)]
#[command(name = "tasklock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory of the lock store.
    #[arg(long, global = true, default_value = DEFAULT_STORE_DIR)]
    pub store: PathBuf,

    /// YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for tasklock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a fresh lock id.
    ///
    /// Use one id per acquisition attempt, and keep using it to renew,
    /// verify and release that acquisition.
    NewId,

    /// Obtain a lock.
    ///
    /// Succeeds if the lock was free or already held by the same lock id.
    Obtain(LockArgs),

    /// Extend a held lock by one task timeout.
    Renew(LockArgs),

    /// Release a held lock.
    ///
    /// Releasing a lock that is no longer held succeeds.
    Release(LockArgs),

    /// Check that a lock id is the current holder.
    Verify(LockArgs),

    /// Delete a lock id's records and any long-expired records.
    Cleanup(LockArgs),

    /// List every stored record for a resource and task type.
    List(TargetArgs),

    /// List the known task types and their lock timeouts.
    TaskTypes,
}

/// Resource and task type naming one lock.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Resource the task works on (e.g., a form id).
    pub resource: String,

    /// Task type (e.g., FORM_DELETION).
    pub task_type: TaskType,
}

/// Arguments for commands acting on behalf of a lock id.
#[derive(Args, Debug)]
pub struct LockArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Lock id of the acquisition attempt.
    #[arg(long)]
    pub lock_id: String,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_new_id() {
        let cli = Cli::try_parse_from(["tasklock", "new-id"]).unwrap();
        assert!(matches!(cli.command, Command::NewId));
        assert_eq!(cli.store, PathBuf::from(DEFAULT_STORE_DIR));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_obtain() {
        let cli = Cli::try_parse_from([
            "tasklock",
            "obtain",
            "form-1",
            "FORM_DELETION",
            "--lock-id",
            "me:1",
        ])
        .unwrap();
        if let Command::Obtain(args) = cli.command {
            assert_eq!(args.target.resource, "form-1");
            assert_eq!(args.target.task_type, TaskType::FormDeletion);
            assert_eq!(args.lock_id, "me:1");
        } else {
            panic!("Expected Obtain command");
        }
    }

    #[test]
    fn parse_task_type_case_insensitively() {
        let cli = Cli::try_parse_from([
            "tasklock",
            "renew",
            "t-9",
            "table-migration",
            "--lock-id",
            "x",
        ])
        .unwrap();
        if let Command::Renew(args) = cli.command {
            assert_eq!(args.target.task_type, TaskType::TableMigration);
        } else {
            panic!("Expected Renew command");
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tasklock",
            "list",
            "form-1",
            "EXPORT_GENERATION",
            "--store",
            "/tmp/locks",
            "--config",
            "tasklock.yaml",
        ])
        .unwrap();
        assert_eq!(cli.store, PathBuf::from("/tmp/locks"));
        assert_eq!(cli.config, Some(PathBuf::from("tasklock.yaml")));
        assert!(matches!(cli.command, Command::List(_)));
    }

    #[test]
    fn lock_commands_require_lock_id() {
        let result = Cli::try_parse_from(["tasklock", "release", "form-1", "FORM_DELETION"]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_task_type_is_rejected() {
        let result =
            Cli::try_parse_from(["tasklock", "verify", "form-1", "NAPPING", "--lock-id", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_task_types() {
        let cli = Cli::try_parse_from(["tasklock", "task-types"]).unwrap();
        assert!(matches!(cli.command, Command::TaskTypes));
    }
}
