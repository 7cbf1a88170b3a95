//! `_includeAssociatedData` values: a closed set of named codes plus an
//! open-ended `custom(code)` escape hatch.

use std::fmt;

/// A single `includeAssociatedData` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociatedData {
    /// `LatestProvenanceResources`.
    LatestProvenanceResources,
    /// `RelevantProvenanceResources`.
    RelevantProvenanceResources,
    /// A server-defined `_`-prefixed extension code.
    Custom(String),
}

impl fmt::Display for AssociatedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestProvenanceResources => write!(f, "LatestProvenanceResources"),
            Self::RelevantProvenanceResources => write!(f, "RelevantProvenanceResources"),
            Self::Custom(code) => write!(f, "{code}"),
        }
    }
}

/// Renders an ordered sequence of [`AssociatedData`] as a comma-joined
/// string, per spec.md's `includeAssociatedData` rendering rule. Returns
/// `None` for an empty sequence (parameters are omitted entirely when
/// their source is empty).
#[must_use]
pub fn render_associated_data(values: &[AssociatedData]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}
