//! Runs a whole-system export against a FHIR server and reports a summary.
//!
//! ```text
//! cargo run --example basic_export -- http://localhost:8080/fhir ./out
//! ```

use std::time::Duration;

use fhir_bulk_client::config::{ExportConfigBuilder, ExportRequest, Level};
use fhir_bulk_client::{export, ExportStats};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "http://localhost:8080/fhir".to_string());
    let output_dir = args.next().unwrap_or_else(|| "./export-out".to_string());

    let config = ExportConfigBuilder::new()
        .fhir_endpoint_url(endpoint)
        .output_dir(output_dir)
        .request(ExportRequest::new(Level::System))
        .timeout(Some(Duration::from_secs(600)))
        .build()?;

    let result = export(config).await?;
    let stats = ExportStats::from_result(&result);
    println!(
        "downloaded {} files, {} bytes total, transaction_time={}",
        stats.files_downloaded, stats.bytes_total, result.transaction_time
    );
    Ok(())
}
