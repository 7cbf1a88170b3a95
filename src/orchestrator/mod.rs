//! The async export orchestrator (C6): the core protocol state machine.
//!
//! ```text
//!         kick-off                            Accepted
//!   INIT ──────────▶ POLLING ◀──────────────────────────┐
//!                      │                                │
//!                      │ Final                  Transient (within budget)
//!                      ▼                                │
//!                   MANIFEST ─────────────────▶ DOWNLOADING ──▶ DONE
//!                      │                                │
//!                      └───────── FatalError / Deadline ─┘ ───▶ FAILED
//! ```

use std::sync::Arc;

use reqwest::Client;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use url::Url;

use crate::auth::TokenProvider;
use crate::config::ExportConfig;
use crate::download::{download_all, plan_downloads, DownloadError};
use crate::error::ExportError;
use crate::manifest::Manifest;
use crate::request_builder::build_kickoff;
use crate::store::{FileStore, LocalFileStore, StoreError};
use crate::time::Deadline;
use crate::transport::{AsyncOutcome, ProtocolTransport, ReqwestTransport};

/// One downloaded file's provenance and size.
#[derive(Debug, Clone)]
pub struct FileResult {
    /// The source URL it was downloaded from.
    pub source: Url,
    /// The name it was written under in the destination store.
    pub destination: String,
    /// Bytes written.
    pub size: u64,
}

/// The outcome of a completed export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// The manifest's `transaction_time`, echoed from the server.
    pub transaction_time: OffsetDateTime,
    /// Every downloaded file, in manifest order.
    pub files: Vec<FileResult>,
}

/// A summary derived from an [`ExportResult`], for logging and reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportStats {
    /// Number of files downloaded.
    pub files_downloaded: usize,
    /// Total bytes written across all files.
    pub bytes_total: u64,
}

impl ExportStats {
    /// Summarizes a result's file list.
    #[must_use]
    pub fn from_result(result: &ExportResult) -> Self {
        Self {
            files_downloaded: result.files.len(),
            bytes_total: result.files.iter().map(|f| f.size).sum(),
        }
    }
}

/// Runs a full export against `config`'s `output_dir`, using the default
/// local-filesystem store.
///
/// # Errors
///
/// See [`ExportError`] for the full error taxonomy.
pub async fn export(config: ExportConfig) -> Result<ExportResult, ExportError> {
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(config.output_dir.clone()));
    export_with_store(config, store).await
}

/// Runs a full export against an arbitrary [`FileStore`] implementation.
///
/// # Errors
///
/// See [`ExportError`] for the full error taxonomy.
#[instrument(skip(config, store), fields(endpoint = %config.fhir_endpoint_url))]
pub async fn export_with_store(
    config: ExportConfig,
    store: Arc<dyn FileStore>,
) -> Result<ExportResult, ExportError> {
    if store.exists().await? {
        return Err(ExportError::Store(StoreError::AlreadyExists(store.uri())));
    }

    let deadline = Deadline::starting_now(config.timeout);

    let tokens = config
        .auth
        .enabled
        .then(|| {
            TokenProvider::new(
                Client::new(),
                config.auth.clone(),
                config.fhir_endpoint_url.clone(),
            )
        })
        .transpose()?;
    let transport = ReqwestTransport::new(&config.http_client, tokens.clone());
    let download_client = transport.client();

    info!("submitting kick-off request");
    let kickoff = build_kickoff(&config.fhir_endpoint_url, &config.request);
    let manifest = match transport.kick_off(&kickoff).await? {
        AsyncOutcome::Accepted {
            content_location, ..
        } => {
            let status_url = content_location.ok_or_else(|| {
                ExportError::Protocol("Accepted kick-off response missing Content-Location".into())
            })?;
            poll_until_final(&transport, &status_url, &config, &deadline).await?
        }
        AsyncOutcome::Final(manifest) => {
            warn!("server returned a Final manifest directly from kick-off");
            manifest
        }
        AsyncOutcome::Transient { status, .. } => {
            return Err(ExportError::Http {
                status,
                outcome_digest: None,
                retry_after: None,
            });
        }
    };

    store.create_dir().await?;

    let entries = plan_downloads(&manifest.output, &config.output_extension);
    let sources: Vec<Url> = entries.iter().map(|e| e.source.clone()).collect();
    let names: Vec<String> = entries
        .iter()
        .map(|e| e.destination_name.clone())
        .collect();

    info!(count = entries.len(), "entering download phase");
    let sizes = download_all(
        download_client,
        tokens,
        Arc::clone(&store),
        entries,
        config.max_concurrent_downloads,
        &deadline,
    )
    .await
    .map_err(|err| match err {
        DownloadError::DeadlineExceeded => {
            ExportError::Timeout(config.timeout.unwrap_or_default())
        }
        other => other.into(),
    })?;

    store.write_success_marker().await?;

    let files = sources
        .into_iter()
        .zip(names)
        .zip(sizes)
        .map(|((source, destination), size)| FileResult {
            source,
            destination,
            size,
        })
        .collect();

    info!("export complete");
    Ok(ExportResult {
        transaction_time: manifest.transaction_time,
        files,
    })
}

async fn poll_until_final(
    transport: &ReqwestTransport,
    status_url: &str,
    config: &ExportConfig,
    deadline: &Deadline,
) -> Result<Manifest, ExportError> {
    let mut transient_count = 0u32;

    loop {
        if deadline.is_expired() {
            return Err(ExportError::Timeout(config.timeout.unwrap_or_default()));
        }

        match transport.check_status(status_url).await? {
            AsyncOutcome::Final(manifest) => return Ok(manifest),
            AsyncOutcome::Accepted { retry_after, .. } => {
                let delay = deadline.clamp(
                    retry_after
                        .unwrap_or(config.async_config.min_polling_delay)
                        .min(config.async_config.max_polling_delay),
                );
                tokio::time::sleep(delay).await;
            }
            AsyncOutcome::Transient {
                status,
                outcome_digest,
                retry_after,
            } => {
                transient_count += 1;
                if transient_count > config.async_config.max_transient_errors {
                    return Err(ExportError::Http {
                        status,
                        outcome_digest,
                        retry_after,
                    });
                }
                warn!(
                    transient_count,
                    budget = config.async_config.max_transient_errors,
                    "transient error polling status, retrying"
                );
                let delay = deadline.clamp(
                    retry_after
                        .unwrap_or(config.async_config.min_polling_delay)
                        .min(config.async_config.max_polling_delay),
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stats_sum_file_sizes() {
        let result = ExportResult {
            transaction_time: OffsetDateTime::UNIX_EPOCH,
            files: vec![
                FileResult {
                    source: Url::parse("http://srv/d/1").unwrap(),
                    destination: "Patient.0000.ndjson".to_string(),
                    size: 10,
                },
                FileResult {
                    source: Url::parse("http://srv/d/2").unwrap(),
                    destination: "Condition.0000.ndjson".to_string(),
                    size: 20,
                },
            ],
        };
        let stats = ExportStats::from_result(&result);
        assert_eq!(stats.files_downloaded, 2);
        assert_eq!(stats.bytes_total, 30);
    }
}
