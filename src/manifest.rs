//! Wire-level value carriers and the completion manifest.
//!
//! The FHIR data model itself is out of scope (spec.md §1): resource type
//! names are opaque strings, and `Parameters`/`Reference` are thin value
//! carriers sufficient to drive the Bulk Data wire protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::time::{format_fhir_instant, parse_fhir_instant};

/// A FHIR `Reference`, reduced to the single field the export protocol uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// The opaque reference string, e.g. `"Patient/0001"`.
    pub reference: String,
}

impl Reference {
    /// Creates a reference from any string-like value.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// A single FHIR `Parameters.parameter` entry, rendered into the shapes the
/// kick-off POST body needs: a string-valued parameter or a
/// reference-valued one.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// `{"name": ..., "valueString": ...}`.
    String {
        /// The parameter name.
        name: String,
        /// The string value.
        #[serde(rename = "valueString")]
        value_string: String,
    },
    /// `{"name": ..., "valueReference": {"reference": ...}}`.
    Reference {
        /// The parameter name (always `"patient"` in this protocol).
        name: String,
        /// The reference value.
        #[serde(rename = "valueReference")]
        value_reference: Reference,
    },
}

/// A FHIR `Parameters` resource: the kick-off POST body.
#[derive(Debug, Clone, Serialize)]
pub struct Parameters {
    #[serde(rename = "resourceType")]
    resource_type: &'static str,
    parameter: Vec<ParameterValue>,
}

impl Parameters {
    /// Creates a `Parameters` resource wrapping the given entries, in order.
    #[must_use]
    pub fn new(parameter: Vec<ParameterValue>) -> Self {
        Self {
            resource_type: "Parameters",
            parameter,
        }
    }
}

/// A single entry in a completion manifest's `output`/`deleted`/`error` list.
#[derive(Debug, Clone, Deserialize)]
pub struct FileItem {
    /// The FHIR resource type contained in the file (e.g. `"Patient"`).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// The URL to download the file from.
    pub url: String,
    /// Optional resource count, if the server reports it.
    pub count: Option<u64>,
}

/// Error deserializing or interpreting a completion manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// `transaction_time` was present but in none of the accepted shapes
    /// (ISO string, epoch millis as a number, epoch millis as a numeric
    /// string).
    #[error("unparseable transaction_time: {0:?}")]
    BadTransactionTime(serde_json::Value),

    /// The manifest body was not valid JSON, or missing required fields.
    #[error("malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The completion manifest returned by a `200 OK` status poll.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// When the server began (or finished) generating the export.
    pub transaction_time: OffsetDateTime,
    /// The kick-off request URL, echoed back by the server.
    pub request: String,
    /// The downloadable output files.
    pub output: Vec<FileItem>,
    /// Deleted-resource file list. Not consumed downstream (spec.md §1 Non-goals).
    pub deleted: Vec<FileItem>,
    /// Per-file error list. Not consumed downstream (spec.md §1 Non-goals).
    pub error: Vec<FileItem>,
}

/// Raw wire shape, before `transaction_time`'s three accepted forms are
/// normalized.
#[derive(Debug, Deserialize)]
struct RawManifest {
    transaction_time: serde_json::Value,
    request: String,
    #[serde(default)]
    output: Vec<FileItem>,
    #[serde(default)]
    deleted: Vec<FileItem>,
    #[serde(default)]
    error: Vec<FileItem>,
}

impl Manifest {
    /// Parses a completion manifest body.
    ///
    /// `transaction_time` is accepted as an ISO-8601 string, an epoch-millis
    /// number, or an epoch-millis numeric string — the source's admitted
    /// looseness, flagged in spec.md §9 as a conformance divergence worth
    /// testing for, is followed here unchanged.
    pub fn parse(body: &[u8]) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_slice(body)?;
        let transaction_time = parse_transaction_time(&raw.transaction_time)?;
        Ok(Self {
            transaction_time,
            request: raw.request,
            output: raw.output,
            deleted: raw.deleted,
            error: raw.error,
        })
    }
}

fn parse_transaction_time(value: &serde_json::Value) -> Result<OffsetDateTime, ManifestError> {
    if let Some(s) = value.as_str() {
        if let Ok(millis) = s.parse::<i64>() {
            return epoch_millis_to_instant(millis)
                .ok_or_else(|| ManifestError::BadTransactionTime(value.clone()));
        }
        return parse_fhir_instant(s)
            .or_else(|_| {
                time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
            })
            .map_err(|_| ManifestError::BadTransactionTime(value.clone()));
    }
    if let Some(millis) = value.as_i64() {
        return epoch_millis_to_instant(millis)
            .ok_or_else(|| ManifestError::BadTransactionTime(value.clone()));
    }
    Err(ManifestError::BadTransactionTime(value.clone()))
}

fn epoch_millis_to_instant(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
