//! Configuration for leaselock.
//!
//! Defines the process-wide `LockSettings` (lock type plus lease timing),
//! loaded from YAML with defaults for every field, and the one-shot
//! install/read pair that fixes them for the life of the process.

mod model;
mod operations;
mod process;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use model::LockSettings;
pub use process::{current, install};
pub use types::{LeaseConfig, LockType};
