//! Pure validation pass (C9): every violation a configuration produces,
//! reported together, before any I/O.

use std::fmt;

use url::Url;

use super::ExportConfigBuilder;

/// A single configuration violation: the offending field path and a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    /// A dotted path identifying the offending field, e.g.
    /// `"authConfig.clientId"`.
    pub path: String,
    /// A human-readable description of the problem.
    pub message: String,
}

impl Violation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Joins violations into one message, sorted by path.
#[must_use]
pub fn format_violations(violations: &[Violation]) -> String {
    let mut sorted = violations.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates a draft configuration, returning every violation found.
///
/// A pure function of the configuration: for the same input it always
/// returns the same (possibly empty) violation set. Disabling
/// authentication (`authConfig.enabled = false`) masks all auth-related
/// violations, since those fields are then simply unused.
#[must_use]
pub fn validate(draft: &ExportConfigBuilder) -> Vec<Violation> {
    let mut violations = Vec::new();

    validate_endpoint(draft, &mut violations);
    validate_level_and_patients(draft, &mut violations);
    validate_auth(draft, &mut violations);
    validate_numeric_bounds(draft, &mut violations);

    violations.sort();
    violations
}

fn validate_endpoint(draft: &ExportConfigBuilder, out: &mut Vec<Violation>) {
    match &draft.fhir_endpoint_url {
        None => out.push(Violation::new(
            "fhirEndpointUrl",
            "fhirEndpointUrl is required",
        )),
        Some(raw) => {
            if Url::parse(raw).is_err() {
                out.push(Violation::new(
                    "fhirEndpointUrl",
                    format!("{raw:?} is not a syntactically valid URL"),
                ));
            }
        }
    }
}

fn validate_level_and_patients(draft: &ExportConfigBuilder, out: &mut Vec<Violation>) {
    if let Some(request) = &draft.request {
        if !request.patients.is_empty() && !request.level.patient_supported() {
            out.push(Violation::new(
                "request.patients",
                format!(
                    "level {} does not support a non-empty patients list",
                    request.level.label()
                ),
            ));
        }
        if let super::Level::Group { id } = &request.level {
            if id.trim().is_empty() {
                out.push(Violation::new(
                    "request.level.id",
                    "Group level requires a non-empty group id",
                ));
            }
        }
    } else {
        out.push(Violation::new("request", "an export request is required"));
    }
}

// Note: the JWK's `alg` is not checked here. It can only be validated once
// the JWK value is parsed, which `TokenProvider::new` does right after
// `build()` succeeds, still before any network I/O.
fn validate_auth(draft: &ExportConfigBuilder, out: &mut Vec<Violation>) {
    if !draft.auth.enabled {
        return;
    }
    if draft.auth.client_id.as_deref().unwrap_or("").is_empty() {
        out.push(Violation::new(
            "authConfig.clientId",
            "clientId is required when authentication is enabled",
        ));
    }
    let has_secret = draft.auth.client_secret.is_some();
    let has_jwk = draft.auth.private_key_jwk.is_some();
    if has_secret == has_jwk {
        out.push(Violation::new(
            "authConfig",
            "exactly one of clientSecret or privateKeyJWK must be set",
        ));
    }
    if !draft.auth.use_smart && draft.auth.token_endpoint.is_none() {
        out.push(Violation::new(
            "authConfig.tokenEndpoint",
            "tokenEndpoint is required when useSMART is false",
        ));
    }
}

fn validate_numeric_bounds(draft: &ExportConfigBuilder, out: &mut Vec<Violation>) {
    if draft.max_concurrent_downloads == 0 {
        out.push(Violation::new(
            "maxConcurrentDownloads",
            "must be >= 1",
        ));
    }
    if draft.http_client.max_connections_per_route < draft.max_concurrent_downloads {
        tracing::warn!(
            max_connections_per_route = draft.http_client.max_connections_per_route,
            max_concurrent_downloads = draft.max_concurrent_downloads,
            "httpClientConfig.maxConnectionsPerRoute is below maxConcurrentDownloads"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{ExportConfigBuilder, Level};
    use crate::config::request::ExportRequest;

    #[test]
    fn aggregates_all_violations_from_scenario_7() {
        let draft = ExportConfigBuilder::new()
            .fhir_endpoint_url("invalid.url")
            .request(ExportRequest::new(Level::System))
            .auth_enabled(true);
        let violations = validate(&draft);
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"fhirEndpointUrl"));
        assert!(paths.contains(&"authConfig.clientId"));
        assert!(paths.contains(&"authConfig"));
    }

    #[test]
    fn disabling_auth_masks_auth_violations() {
        let draft = ExportConfigBuilder::new()
            .fhir_endpoint_url("http://srv/fhir")
            .request(ExportRequest::new(Level::System));
        let violations = validate(&draft);
        assert!(violations.iter().all(|v| !v.path.starts_with("authConfig")));
    }

    #[test]
    fn system_level_with_patients_is_invalid() {
        let mut request = ExportRequest::new(Level::System);
        request.patients.push(crate::manifest::Reference::new("Patient/1"));
        let draft = ExportConfigBuilder::new()
            .fhir_endpoint_url("http://srv/fhir")
            .request(request);
        let violations = validate(&draft);
        assert!(violations.iter().any(|v| v.path == "request.patients"));
    }

    #[test]
    fn violations_are_sorted_by_path() {
        let draft = ExportConfigBuilder::new().fhir_endpoint_url("bad url").auth_enabled(true);
        let violations = validate(&draft);
        let mut sorted = violations.clone();
        sorted.sort();
        assert_eq!(violations, sorted);
    }
}
