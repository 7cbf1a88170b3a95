//! Parser for the HTTP `Retry-After` header (C2).
//!
//! Accepts either delta-seconds (a non-negative integer) or an HTTP-date,
//! and converts either form into a duration-from-now.

use std::time::Duration;

use tracing::{debug, warn};

/// Parses a `Retry-After` header value into a duration from now.
///
/// - Delta-seconds `n` yields `Duration::from_secs(n)`.
/// - A future HTTP-date yields a non-negative duration.
/// - A past HTTP-date yields `Duration::ZERO`.
/// - Anything else (negative seconds, unparseable dates) yields `None`.
///
/// The result is returned uncapped: a ceiling on how long the caller is
/// actually willing to wait belongs to the caller (the orchestrator clamps
/// against `AsyncConfig::max_polling_delay`), not to this parser.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        let duration = datetime
            .duration_since(now)
            .unwrap_or(Duration::ZERO);
        return Some(duration);
    }

    warn!(value = %header_value, "unparseable Retry-After header");
    None
}
