//! Exit code constants for the leaselock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: Filesystem failure
//! - 3: Lock ownership lost while held
//! - 4: Lock held by another process

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Filesystem failure while reading or writing lock state.
pub const IO_FAILURE: i32 = 2;

/// The lease was stolen or its file vanished while the lock was held.
pub const OWNERSHIP_LOST: i32 = 3;

/// Lock acquisition failure: another live holder owns the lock.
pub const LOCK_UNAVAILABLE: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, IO_FAILURE, OWNERSHIP_LOST, LOCK_UNAVAILABLE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
