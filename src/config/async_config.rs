//! Polling pacing configuration consumed by the orchestrator (C6).

use std::time::Duration;

/// Controls the poll loop's server-driven pacing and transient-error
/// tolerance.
#[derive(Debug, Clone)]
pub struct AsyncConfig {
    /// Upper bound on cumulative `TransientError` responses during polling
    /// before the export fails. A budget over the whole poll, not reset by
    /// intervening successes.
    pub max_transient_errors: u32,
    /// Delay used when a poll response carries no `Retry-After`.
    pub min_polling_delay: Duration,
    /// Ceiling applied to any server-suggested delay.
    pub max_polling_delay: Duration,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            max_transient_errors: 3,
            min_polling_delay: Duration::from_secs(1),
            max_polling_delay: Duration::from_secs(60),
        }
    }
}
