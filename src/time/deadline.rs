//! Absolute deadline computed once at `export()` entry (C1).
//!
//! A fixed client-side interval would either hammer slow servers or waste
//! time against fast ones, so the orchestrator tracks wall-clock budget as a
//! single absolute instant shared by polling and downloading, rather than a
//! per-operation timeout.

use std::time::Duration;

use tokio::time::Instant;

/// An absolute deadline, or the absence of one.
///
/// Constructed once from a requested [`Duration`]; `None` (no timeout, or a
/// non-positive one) means the export runs with no wall-clock bound.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// Computes an absolute deadline `timeout` from now.
    ///
    /// `timeout == None` or a zero duration both mean "no deadline" — the
    /// spec's `timeout ≤ 0 ⇒ no deadline` collapses to `Option::None` in the
    /// Rust API (see DESIGN.md).
    #[must_use]
    pub fn starting_now(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(d) if d > Duration::ZERO => Self(Some(Instant::now() + d)),
            _ => Self(None),
        }
    }

    /// A deadline that never expires.
    #[must_use]
    pub fn unbounded() -> Self {
        Self(None)
    }

    /// Time remaining until the deadline, or `None` if unbounded.
    ///
    /// Returns `Some(Duration::ZERO)` rather than a negative duration once
    /// the deadline has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    /// Clamps `delay` so it never overshoots the remaining budget.
    ///
    /// Used by the poll loop: a server-suggested sleep should not be honored
    /// past the point where the whole export is already out of time.
    #[must_use]
    pub fn clamp(&self, delay: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => delay.min(remaining),
            None => delay,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_unbounded() {
        let d = Deadline::starting_now(Some(Duration::ZERO));
        assert!(d.remaining().is_none());
        assert!(!d.is_expired());
    }

    #[test]
    fn none_timeout_is_unbounded() {
        let d = Deadline::starting_now(None);
        assert!(d.remaining().is_none());
    }

    #[test]
    fn positive_timeout_counts_down() {
        let d = Deadline::starting_now(Some(Duration::from_millis(50)));
        assert!(d.remaining().is_some());
        std::thread::sleep(Duration::from_millis(80));
        assert!(d.is_expired());
        assert_eq!(d.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn clamp_bounds_to_remaining() {
        let d = Deadline::starting_now(Some(Duration::from_secs(1)));
        let clamped = d.clamp(Duration::from_secs(60));
        assert!(clamped <= Duration::from_secs(1));
    }

    #[test]
    fn clamp_unbounded_is_noop() {
        let d = Deadline::unbounded();
        assert_eq!(d.clamp(Duration::from_secs(60)), Duration::from_secs(60));
    }
}
