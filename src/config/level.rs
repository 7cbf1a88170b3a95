//! Export level: the tagged variant the FHIR spec fixes as a closed set.
//!
//! The source this crate is informed by models `Level` as an open
//! interface; re-architected here as a closed tagged variant, since no
//! extension point is needed — the Bulk Data spec defines exactly three
//! kick-off shapes.

/// The scope of a bulk export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Level {
    /// Whole-system export: `$export`.
    System,
    /// All-patient export: `Patient/$export`.
    Patient,
    /// A single group's members: `Group/{id}/$export`.
    Group {
        /// The FHIR `Group` resource id (must be non-empty).
        id: String,
    },
}

impl Level {
    /// The path segment appended to the FHIR endpoint, e.g. `"Patient/$export"`.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::System => "$export".to_string(),
            Self::Patient => "Patient/$export".to_string(),
            Self::Group { id } => format!("Group/{id}/$export"),
        }
    }

    /// Whether this level permits a non-empty `patients` list.
    #[must_use]
    pub fn patient_supported(&self) -> bool {
        !matches!(self, Self::System)
    }

    /// A short label for diagnostics and violation messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Patient => "Patient",
            Self::Group { .. } => "Group",
        }
    }
}
