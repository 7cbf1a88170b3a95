//! The validated export request: level, filters, and the patient list.

use time::OffsetDateTime;

use super::associated_data::AssociatedData;
use super::level::Level;
use crate::manifest::Reference;

/// Default `_outputFormat` when the caller doesn't specify one.
pub const DEFAULT_OUTPUT_FORMAT: &str = "application/fhir+ndjson";

/// A bulk export request: everything that shapes the kick-off call.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// The export scope (`System`, `Patient`, or `Group{id}`).
    pub level: Level,
    /// Requested output MIME type. Defaults to [`DEFAULT_OUTPUT_FORMAT`].
    pub output_format: String,
    /// Only include resources modified since this instant.
    pub since: Option<OffsetDateTime>,
    /// Resource types to include. Empty means "all".
    pub types: Vec<String>,
    /// `_elements` to include per resource.
    pub elements: Vec<String>,
    /// `_typeFilter` expressions.
    pub type_filters: Vec<String>,
    /// `_includeAssociatedData` codes.
    pub include_associated_data: Vec<AssociatedData>,
    /// Patient references to scope the export to. Non-empty forces a POST
    /// kick-off with a FHIR `Parameters` body.
    pub patients: Vec<Reference>,
}

impl ExportRequest {
    /// Starts building a request at the given level, with all optional
    /// fields empty/default.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            level,
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            since: None,
            types: Vec::new(),
            elements: Vec::new(),
            type_filters: Vec::new(),
            include_associated_data: Vec::new(),
            patients: Vec::new(),
        }
    }

    /// Whether the kick-off must be a POST (patient list is non-empty).
    #[must_use]
    pub fn requires_post(&self) -> bool {
        !self.patients.is_empty()
    }
}
