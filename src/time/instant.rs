//! The FHIR instant wire format: `yyyy-MM-dd'T'HH:mm:ss.SSSXXX`.
//!
//! Always rendered in UTC with exactly three fractional-second digits on
//! output; on input, any zone offset is accepted and normalized to
//! UTC-millisecond.

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Error parsing or formatting a FHIR instant.
#[derive(Debug, Error)]
pub enum FhirInstantError {
    /// The input string is not a valid RFC 3339 timestamp.
    #[error("invalid FHIR instant {input:?}: {source}")]
    Parse {
        /// The offending input.
        input: String,
        /// The underlying parser error.
        #[source]
        source: time::error::Parse,
    },
}

/// Parses a FHIR instant string into a millisecond-precision UTC instant.
///
/// Accepts any zone offset (including `Z`) and any fractional-second
/// precision; the result is normalized to UTC with sub-millisecond
/// precision truncated (not rounded).
pub fn parse_fhir_instant(input: &str) -> Result<OffsetDateTime, FhirInstantError> {
    let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|source| FhirInstantError::Parse {
        input: input.to_string(),
        source,
    })?;
    let utc = parsed.to_offset(UtcOffset::UTC);
    Ok(truncate_to_millis(utc))
}

/// Formats a UTC instant as `yyyy-MM-dd'T'HH:mm:ss.SSSXXX`, always with a
/// literal `Z` offset (the instant is normalized to UTC before formatting).
#[must_use]
pub fn format_fhir_instant(instant: OffsetDateTime) -> String {
    let utc = truncate_to_millis(instant.to_offset(UtcOffset::UTC));
    let millis = utc.millisecond();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        utc.year(),
        utc.month() as u8,
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second(),
        millis
    )
}

fn truncate_to_millis(dt: OffsetDateTime) -> OffsetDateTime {
    let nanos_in_ms = 1_000_000;
    let truncated_nanos = (dt.nanosecond() / nanos_in_ms) * nanos_in_ms;
    dt.replace_nanosecond(truncated_nanos)
        .unwrap_or(dt)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn round_trip_at_millisecond_precision() {
        let original = datetime!(2024-01-01 00:00:00.123 UTC);
        let formatted = format_fhir_instant(original);
        assert_eq!(formatted, "2024-01-01T00:00:00.123Z");
        let parsed = parse_fhir_instant(&formatted).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn non_utc_input_normalizes() {
        // +02:00 one hour ahead of... normalize to UTC representation
        let parsed = parse_fhir_instant("2024-01-01T02:30:00.500+02:00").unwrap();
        let formatted = format_fhir_instant(parsed);
        assert_eq!(formatted, "2024-01-01T00:30:00.500Z");
    }

    #[test]
    fn sub_millisecond_precision_is_truncated() {
        let parsed = parse_fhir_instant("2024-01-01T00:00:00.123456789Z").unwrap();
        assert_eq!(format_fhir_instant(parsed), "2024-01-01T00:00:00.123Z");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_fhir_instant("not-a-timestamp").is_err());
    }

    #[test]
    fn zero_offset_formats_as_z() {
        let parsed = parse_fhir_instant("2024-06-15T12:00:00Z").unwrap();
        assert_eq!(format_fhir_instant(parsed), "2024-06-15T12:00:00.000Z");
    }
}
