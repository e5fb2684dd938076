//! Implementation of the `leaselock status` command.

use crate::cli::StatusArgs;
use leaselock::FileLock;
use leaselock::error::Result;

/// Execute the `leaselock status` command.
///
/// Prints one line describing the lock file, or that there is none.
pub fn cmd_status(args: StatusArgs, lock: &FileLock) -> Result<()> {
    match lock.inspect(&args.path)? {
        Some(info) => println!("{}", info),
        None => println!("{}: no lock", args.path.display()),
    }

    Ok(())
}
