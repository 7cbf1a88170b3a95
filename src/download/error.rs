//! Error types for the parallel download engine (C7).

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while downloading manifest output files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A network-level failure reaching a download URL.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// A download URL returned a non-200 status.
    #[error("HTTP {status} downloading {url}")]
    Http {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Writing the downloaded bytes to the file store failed.
    #[error("store error downloading {url}: {source}")]
    Store {
        /// The URL being downloaded when the write failed.
        url: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// The remaining deadline expired before every entry finished.
    #[error("download phase exceeded the export deadline")]
    DeadlineExceeded,
}
