//! A single entry's download: GET the source URL and stream it to a handle.

use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use crate::auth::TokenProvider;
use crate::store::{FileHandle, StoreError};

/// Downloads one URL's body into `handle`, returning the byte count written.
///
/// The bearer token is attached only when `source` is same-origin with the
/// FHIR endpoint the token provider was created for — download URLs are
/// otherwise treated as opaque and may point at a CDN outside that trust
/// boundary.
#[instrument(skip(client, tokens, handle), fields(url = %source))]
pub async fn download_one(
    client: &Client,
    tokens: Option<&Arc<TokenProvider>>,
    source: &Url,
    handle: &mut dyn FileHandle,
) -> Result<u64, DownloadError> {
    let mut builder = client.get(source.clone());
    if let Some(provider) = tokens {
        if provider.is_same_origin(source) {
            if let Some(token) = provider
                .token()
                .await
                .map_err(|_| DownloadError::Http {
                    url: source.to_string(),
                    status: 401,
                })?
            {
                builder = builder.bearer_auth(token);
            }
        }
    }

    let response = builder.send().await.map_err(|e| DownloadError::Network {
        url: source.to_string(),
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Http {
            url: source.to_string(),
            status: status.as_u16(),
        });
    }

    let stream = Box::pin(response.bytes_stream());
    let written = handle
        .write_stream(stream)
        .await
        .map_err(|e: StoreError| DownloadError::Store {
            url: source.to_string(),
            source: e,
        })?;
    debug!(bytes = written, "download complete");
    Ok(written)
}
