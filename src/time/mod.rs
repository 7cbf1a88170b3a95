//! Wall-clock helpers: the export deadline clock (C1) and the FHIR instant
//! wire format.

mod deadline;
mod instant;

pub use deadline::Deadline;
pub use instant::{format_fhir_instant, parse_fhir_instant, FhirInstantError};
