//! CLI argument parsing for leaselock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use leaselock::config::LockType;
use std::path::PathBuf;

/// Leaselock: lease-based cross-process file locks.
///
/// Acquire, inspect, and clear locks that coordinate processes across local,
/// shared, and network filesystems.
#[derive(Parser, Debug)]
#[command(name = "leaselock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML settings file (lock type and lease timing).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Lock type to use, overriding the settings file.
    #[arg(long, global = true, value_parser = parse_lock_type)]
    pub lock_type: Option<LockType>,

    /// Log lock activity to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for leaselock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire a lock and hold it.
    ///
    /// Keeps the lease refreshed until Ctrl-C or the hold time elapses,
    /// then releases it.
    Acquire(AcquireArgs),

    /// Show whether a lock is held, by whom, and how fresh it is.
    Status(StatusArgs),

    /// Clear a link-based lock file.
    ///
    /// Refuses to clear a live lock without --force.
    Clear(ClearArgs),
}

/// Arguments for the `acquire` command.
#[derive(Parser, Debug)]
pub struct AcquireArgs {
    /// Path of the lock file.
    pub path: PathBuf,

    /// Release after this many seconds instead of waiting for Ctrl-C.
    #[arg(long, value_name = "SECS")]
    pub hold_secs: Option<u64>,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Path of the lock file.
    pub path: PathBuf,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Path of the lock file.
    pub path: PathBuf,

    /// Clear the lock even if its holder is still refreshing it.
    #[arg(long)]
    pub force: bool,
}

fn parse_lock_type(s: &str) -> Result<LockType, String> {
    LockType::from_str(s).ok_or_else(|| {
        format!(
            "unknown lock type '{}' (expected '{}' or '{}')",
            s,
            LockType::Advisory,
            LockType::LinkBased
        )
    })
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
