//! Filesystem utilities for leaselock.
//!
//! Helpers for the sibling files that lock acquisition relies on, and for
//! reading and setting modification times, which carry lease timestamps.

mod sibling;
mod times;

pub use sibling::{ensure_parent_dir, keyed_sibling, sync_parent_dir, unique_sibling, write_new};
pub use times::{age_since, modified_at, system_time_to_utc, touch};
