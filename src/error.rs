//! Crate-wide error taxonomy for the export orchestrator.
//!
//! Component-local error enums (`ConfigError`, `AuthError`, `TransportError`,
//! `DownloadError`, `StoreError`) carry the detail needed at their own layer;
//! they convert into [`ExportError`] at the orchestrator boundary, the same
//! layering the reference client uses between `download::DownloadError` and
//! its call sites.

use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::download::DownloadError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Top-level error returned by [`crate::orchestrator::export`].
#[derive(Debug, Error)]
pub enum ExportError {
    /// Validation failed, or the destination directory already existed.
    /// Raised before any network I/O.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A non-classifiable non-2xx response from a protocol call, or a
    /// non-200 from a download.
    #[error("HTTP {status} error{}", retry_after.map(|d| format!(" (retry-after {}s)", d.as_secs())).unwrap_or_default())]
    Http {
        /// The HTTP status code returned.
        status: u16,
        /// A short digest of the `OperationOutcome` body, if present.
        outcome_digest: Option<String>,
        /// The parsed `Retry-After` delay, if the response carried one.
        retry_after: Option<Duration>,
    },

    /// Malformed manifest, missing `Content-Location` on an Accepted
    /// response, or unparseable JSON.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Token acquisition or refresh failed.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A download worker failed; the whole operation fails with it.
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The file store rejected an operation outside the download phase
    /// (e.g. creating the destination directory).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The global deadline expired during polling or downloading.
    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    /// Task interruption or an unclassified I/O failure.
    #[error("system error: {0}")]
    System(String),
}

impl From<TransportError> for ExportError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http {
                status,
                outcome_digest,
                retry_after,
            } => Self::Http {
                status,
                outcome_digest,
                retry_after,
            },
            TransportError::Protocol(msg) => Self::Protocol(msg),
            TransportError::Auth(e) => Self::Auth(e),
            TransportError::Network(msg) => Self::System(msg),
        }
    }
}
