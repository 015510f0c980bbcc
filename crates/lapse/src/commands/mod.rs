//! CLI command handlers.

pub mod demo;
pub mod stress;

use std::time::Duration;

use lapse_session::StoreConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Configuration for the store each command builds.
    pub config: StoreConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Whole milliseconds in `d` for reports, saturating at `u64::MAX`.
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
