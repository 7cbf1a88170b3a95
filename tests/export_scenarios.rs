//! End-to-end export scenarios, driven against a mocked FHIR server.

use std::time::Duration;

use fhir_bulk_client::config::{AsyncConfig, ExportConfigBuilder, ExportRequest, Level};
use fhir_bulk_client::{export, ExportError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manifest_body(files: &[(&str, &str)]) -> serde_json::Value {
    serde_json::json!({
        "transaction_time": "2024-01-01T00:00:00.000Z",
        "request": "http://srv/fhir/$export",
        "output": files.iter().map(|(ty, url)| serde_json::json!({"type": ty, "url": url})).collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn system_export_no_auth_downloads_both_files() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .and(query_param("_type", "Patient,Condition"))
        .and(header("accept", "application/fhir+json"))
        .and(header("prefer", "respond-async"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Location", format!("{}/poll/1", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body(&[
            ("Patient", &format!("{}/d/1", server.uri())),
            ("Condition", &format!("{}/d/2", server.uri())),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/d/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"patient-ndjson".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"condition-ndjson".to_vec()))
        .mount(&server)
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let output_dir = out_dir.path().join("export");

    let mut request = ExportRequest::new(Level::System);
    request.types = vec!["Patient".to_string(), "Condition".to_string()];

    let config = ExportConfigBuilder::new()
        .fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .request(request)
        .output_dir(&output_dir)
        .build()
        .unwrap();

    let result = export(config).await.unwrap();
    assert_eq!(result.files.len(), 2);
    assert!(output_dir.join("Patient.0000.ndjson").exists());
    assert!(output_dir.join("Condition.0000.ndjson").exists());
    assert!(output_dir.join("_SUCCESS").exists());
}

#[tokio::test]
async fn group_export_with_patients_sends_post_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/fhir/Group/id0001/$export"))
        .and(header(
            "content-type",
            "application/fhir+json; charset=UTF-8",
        ))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Location", format!("{}/poll/1", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body(&[])))
        .mount(&server)
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let mut request = ExportRequest::new(Level::Group {
        id: "id0001".to_string(),
    });
    request.types = vec!["Patient".to_string(), "Condition".to_string()];
    request
        .patients
        .push(fhir_bulk_client::manifest::Reference::new("Patient/0001"));

    let config = ExportConfigBuilder::new()
        .fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .request(request)
        .output_dir(out_dir.path().join("export"))
        .build()
        .unwrap();

    let result = export(config).await.unwrap();
    assert!(result.files.is_empty());
}

#[tokio::test]
async fn transient_errors_within_budget_eventually_succeed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Location", format!("{}/poll/1", server.uri())),
        )
        .mount(&server)
        .await;

    let outcome = serde_json::json!({"issue": [{"code": "transient"}]});
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("Retry-After", "1")
                .set_body_json(&outcome),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body(&[])))
        .mount(&server)
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let config = ExportConfigBuilder::new()
        .fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .request(ExportRequest::new(Level::System))
        .output_dir(out_dir.path().join("export"))
        .async_config(AsyncConfig {
            max_transient_errors: 3,
            ..AsyncConfig::default()
        })
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let result = export(config).await.unwrap();
    assert!(result.files.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn transient_budget_exhausted_fails_before_any_download() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Location", format!("{}/poll/1", server.uri())),
        )
        .mount(&server)
        .await;

    let outcome = serde_json::json!({"issue": [{"code": "transient"}]});
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(503).set_body_json(&outcome))
        .mount(&server)
        .await;

    let out_dir = tempfile::tempdir().unwrap();
    let output_dir = out_dir.path().join("export");
    let config = ExportConfigBuilder::new()
        .fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .request(ExportRequest::new(Level::System))
        .output_dir(&output_dir)
        .async_config(AsyncConfig {
            max_transient_errors: 1,
            min_polling_delay: Duration::from_millis(10),
            max_polling_delay: Duration::from_millis(10),
        })
        .build()
        .unwrap();

    let err = export(config).await.unwrap_err();
    assert!(matches!(err, ExportError::Http { status: 503, .. }));
    assert!(!output_dir.exists());
}

#[tokio::test]
async fn multi_part_resource_downloads_are_densely_numbered() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Content-Location", format!("{}/poll/1", server.uri())),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body(&[
            ("Condition", &format!("{}/d/1", server.uri())),
            ("Condition", &format!("{}/d/2", server.uri())),
            ("Condition", &format!("{}/d/3", server.uri())),
        ])))
        .mount(&server)
        .await;

    for path_segment in ["/d/1", "/d/2", "/d/3"] {
        Mock::given(method("GET"))
            .and(path(path_segment))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .mount(&server)
            .await;
    }

    let out_dir = tempfile::tempdir().unwrap();
    let output_dir = out_dir.path().join("export");
    let config = ExportConfigBuilder::new()
        .fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .request(ExportRequest::new(Level::System))
        .output_dir(&output_dir)
        .build()
        .unwrap();

    export(config).await.unwrap();
    assert!(output_dir.join("Condition.0000.ndjson").exists());
    assert!(output_dir.join("Condition.0001.ndjson").exists());
    assert!(output_dir.join("Condition.0002.ndjson").exists());
}

#[tokio::test]
async fn invalid_configuration_reports_every_violation() {
    let err = ExportConfigBuilder::new()
        .fhir_endpoint_url("invalid.url")
        .request(ExportRequest::new(Level::System))
        .auth_enabled(true)
        .build()
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("fhirEndpointUrl"));
    assert!(message.contains("authConfig.clientId"));
    assert!(message.contains("authConfig"));
}

#[tokio::test]
async fn destination_directory_already_existing_fails_before_kickoff() {
    let server = MockServer::start().await;
    // No mocks registered: a pre-flight existence check must short-circuit
    // before any network call is made.

    let out_dir = tempfile::tempdir().unwrap();
    let output_dir = out_dir.path().join("export");
    std::fs::create_dir_all(&output_dir).unwrap();

    let config = ExportConfigBuilder::new()
        .fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .request(ExportRequest::new(Level::System))
        .output_dir(&output_dir)
        .build()
        .unwrap();

    let err = export(config).await.unwrap_err();
    assert!(matches!(err, ExportError::Store(_)));
}
