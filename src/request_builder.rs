//! Translates a validated export request into a kick-off HTTP call (C8).

use reqwest::Method;
use url::Url;

use crate::config::{render_associated_data, ExportRequest};
use crate::manifest::{ParameterValue, Parameters};
use crate::time::format_fhir_instant;

/// A fully-formed kick-off request, ready to hand to the transport.
#[derive(Debug, Clone)]
pub struct KickOffRequest {
    /// `GET` when `patients` is empty, `POST` otherwise.
    pub method: Method,
    /// The resolved, fully-qualified kick-off URL.
    pub url: Url,
    /// The serialized `Parameters` body, present only for POST requests.
    pub body: Option<Vec<u8>>,
}

/// Builds the kick-off request for `request` against `endpoint`.
///
/// The endpoint is given a guaranteed trailing slash before the level path
/// is resolved against it, so `Url::join` treats the level path as relative
/// rather than replacing the endpoint's last segment.
#[must_use]
pub fn build_kickoff(endpoint: &Url, request: &ExportRequest) -> KickOffRequest {
    let base = with_trailing_slash(endpoint);
    #[allow(clippy::expect_used)]
    let url = base
        .join(&request.level.path())
        .expect("level path is always a valid relative reference");

    if request.requires_post() {
        let body = Parameters::new(build_parameter_list(request));
        #[allow(clippy::expect_used)]
        let body = serde_json::to_vec(&body).expect("Parameters always serializes");
        KickOffRequest {
            method: Method::POST,
            url,
            body: Some(body),
        }
    } else {
        let url = append_query_params(url, request);
        KickOffRequest {
            method: Method::GET,
            url,
            body: None,
        }
    }
}

/// Ensures `url`'s path ends in `/`, so [`Url::join`] treats a relative
/// reference resolved against it as an addition rather than a replacement
/// of the last path segment.
pub(crate) fn with_trailing_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut url = url.clone();
    url.set_path(&format!("{}/", url.path()));
    url
}

fn append_query_params(mut url: Url, request: &ExportRequest) -> Url {
    {
        let mut pairs = url.query_pairs_mut();
        if request.output_format != crate::config::request::DEFAULT_OUTPUT_FORMAT {
            pairs.append_pair("_outputFormat", &request.output_format);
        }
        if let Some(since) = request.since {
            pairs.append_pair("_since", &format_fhir_instant(since));
        }
        if !request.types.is_empty() {
            pairs.append_pair("_type", &request.types.join(","));
        }
        if !request.elements.is_empty() {
            pairs.append_pair("_elements", &request.elements.join(","));
        }
        if !request.type_filters.is_empty() {
            pairs.append_pair("_typeFilter", &request.type_filters.join(","));
        }
        if let Some(joined) = render_associated_data(&request.include_associated_data) {
            pairs.append_pair("includeAssociatedData", &joined);
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    url
}

fn build_parameter_list(request: &ExportRequest) -> Vec<ParameterValue> {
    let mut params = Vec::new();

    if request.output_format != crate::config::request::DEFAULT_OUTPUT_FORMAT {
        params.push(ParameterValue::String {
            name: "_outputFormat".to_string(),
            value_string: request.output_format.clone(),
        });
    }
    if let Some(since) = request.since {
        params.push(ParameterValue::String {
            name: "_since".to_string(),
            value_string: format_fhir_instant(since),
        });
    }
    if !request.types.is_empty() {
        params.push(ParameterValue::String {
            name: "_type".to_string(),
            value_string: request.types.join(","),
        });
    }
    if !request.elements.is_empty() {
        params.push(ParameterValue::String {
            name: "_elements".to_string(),
            value_string: request.elements.join(","),
        });
    }
    if !request.type_filters.is_empty() {
        params.push(ParameterValue::String {
            name: "_typeFilter".to_string(),
            value_string: request.type_filters.join(","),
        });
    }
    if let Some(joined) = render_associated_data(&request.include_associated_data) {
        params.push(ParameterValue::String {
            name: "includeAssociatedData".to_string(),
            value_string: joined,
        });
    }
    for patient in &request.patients {
        params.push(ParameterValue::Reference {
            name: "patient".to_string(),
            value_reference: patient.clone(),
        });
    }

    params
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Level;

    #[test]
    fn system_get_joins_types_and_omits_empty_fields() {
        let endpoint = Url::parse("http://srv/fhir").unwrap();
        let mut request = ExportRequest::new(Level::System);
        request.types = vec!["Patient".to_string(), "Condition".to_string()];
        let built = build_kickoff(&endpoint, &request);
        assert_eq!(built.method, Method::GET);
        assert_eq!(
            built.url.as_str(),
            "http://srv/fhir/$export?_type=Patient%2CCondition"
        );
        assert!(built.body.is_none());
    }

    #[test]
    fn group_with_patients_builds_post_body_in_order() {
        let endpoint = Url::parse("http://srv/fhir").unwrap();
        let mut request = ExportRequest::new(Level::Group {
            id: "id0001".to_string(),
        });
        request.types = vec!["Patient".to_string(), "Condition".to_string()];
        request
            .patients
            .push(crate::manifest::Reference::new("Patient/0001"));
        let built = build_kickoff(&endpoint, &request);
        assert_eq!(built.method, Method::POST);
        assert_eq!(built.url.as_str(), "http://srv/fhir/Group/id0001/$export");
        let body = built.body.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let params = parsed["parameter"].as_array().unwrap();
        assert_eq!(params[0]["name"], "_type");
        assert_eq!(params[0]["valueString"], "Patient,Condition");
        assert_eq!(params[1]["name"], "patient");
        assert_eq!(params[1]["valueReference"]["reference"], "Patient/0001");
    }

    #[test]
    fn trailing_slash_is_added_before_join() {
        let endpoint = Url::parse("http://srv/fhir").unwrap();
        let request = ExportRequest::new(Level::Patient);
        let built = build_kickoff(&endpoint, &request);
        assert_eq!(built.url.as_str(), "http://srv/fhir/Patient/$export");
    }
}
