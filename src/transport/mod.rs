//! Protocol transport: kick-off, status poll, and manifest retrieval (C5).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_LOCATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::auth::{AuthError, TokenProvider};
use crate::config::HttpClientConfig;
use crate::manifest::{Manifest, ManifestError};
use crate::request_builder::KickOffRequest;
use crate::retry_after::parse_retry_after;

/// Error surfaced by a protocol-layer transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A non-classifiable non-2xx response (fatal, per §4.2).
    #[error("HTTP {status} error")]
    Http {
        /// The response status code.
        status: u16,
        /// A short digest of the `OperationOutcome` body, if present.
        outcome_digest: Option<String>,
        /// The parsed `Retry-After` delay, if present.
        retry_after: Option<Duration>,
    },

    /// Malformed manifest JSON, or an Accepted response missing
    /// `Content-Location`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Token acquisition failed while preparing this call.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A network-level failure.
    #[error("network error: {0}")]
    Network(String),
}

/// A classified asynchronous protocol response.
#[derive(Debug)]
pub enum AsyncOutcome {
    /// The server is still computing the export.
    Accepted {
        /// The status URL to poll next.
        content_location: Option<String>,
        /// An informational progress string, logged but not acted on.
        progress: Option<String>,
        /// How long to wait before polling again.
        retry_after: Option<Duration>,
    },
    /// The export finished; the manifest is ready.
    Final(Manifest),
    /// A retry-eligible server error.
    Transient {
        /// The response status, carried so a budget-exhausted failure can
        /// surface it as `HttpError(status, …)`.
        status: u16,
        /// A short digest of the `OperationOutcome` body.
        outcome_digest: Option<String>,
        /// How long to wait before retrying.
        retry_after: Option<Duration>,
    },
}

/// The three protocol-layer calls the orchestrator drives.
#[async_trait]
pub trait ProtocolTransport: Send + Sync {
    /// Submits the kick-off request.
    async fn kick_off(&self, request: &KickOffRequest) -> Result<AsyncOutcome, TransportError>;

    /// Polls a status URL, returning its classified outcome.
    async fn check_status(&self, status_url: &str) -> Result<AsyncOutcome, TransportError>;
}

/// [`ProtocolTransport`] backed by `reqwest`, with token injection from a
/// [`TokenProvider`].
pub struct ReqwestTransport {
    client: Client,
    tokens: Option<Arc<TokenProvider>>,
    retry_count: u32,
}

impl ReqwestTransport {
    /// Builds a transport from `http_client_config` and an optional token
    /// provider (`None` when authentication is disabled).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(http_client_config: &HttpClientConfig, tokens: Option<Arc<TokenProvider>>) -> Self {
        let client = Client::builder()
            .timeout(http_client_config.socket_timeout)
            .pool_max_idle_per_host(http_client_config.max_connections_per_route)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            tokens,
            retry_count: http_client_config.retry_count,
        }
    }

    /// Returns a cheap clone of the underlying client, for reuse by the
    /// download engine's connection pool.
    #[must_use]
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    async fn authorization_header(&self) -> Result<Option<String>, TransportError> {
        let Some(provider) = &self.tokens else {
            return Ok(None);
        };
        let token = provider.token().await?;
        Ok(token.map(|t| format!("Bearer {t}")))
    }

    /// Sends `builder`, retrying up to `retry_count` additional times on a
    /// socket-level failure (connection refused, DNS, read timeout — never
    /// on an HTTP status, which always comes back as `Ok(Response)`).
    ///
    /// A request whose body can't be cloned (e.g. a non-rewindable stream)
    /// is sent once, since there is nothing to retry with; ours are always
    /// a GET or a buffered `Vec<u8>` POST body, both of which clone.
    async fn send_with_retry(
        &self,
        mut builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let mut attempt = 0u32;
        loop {
            let retry_builder = builder.try_clone();
            match builder.send().await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    attempt += 1;
                    let Some(next) = retry_builder.filter(|_| attempt <= self.retry_count) else {
                        return Err(TransportError::Network(err.to_string()));
                    };
                    warn!(
                        attempt,
                        max_attempts = self.retry_count,
                        error = %err,
                        "socket-level failure, retrying"
                    );
                    builder = next;
                }
            }
        }
    }
}

#[async_trait]
impl ProtocolTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn kick_off(&self, request: &KickOffRequest) -> Result<AsyncOutcome, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header(ACCEPT, "application/fhir+json")
            .header("Prefer", "respond-async");

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/fhir+json; charset=UTF-8")
                .body(body.clone());
        }
        if let Some(auth) = self.authorization_header().await? {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = self.send_with_retry(builder).await?;
        classify(response).await
    }

    #[instrument(skip(self))]
    async fn check_status(&self, status_url: &str) -> Result<AsyncOutcome, TransportError> {
        let mut builder = self
            .client
            .get(status_url)
            .header(ACCEPT, "application/json");
        if let Some(auth) = self.authorization_header().await? {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }
        let response = self.send_with_retry(builder).await?;
        classify(response).await
    }
}

async fn classify(response: reqwest::Response) -> Result<AsyncOutcome, TransportError> {
    let status = response.status();
    let headers = response.headers().clone();

    match status {
        StatusCode::OK => {
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            Manifest::parse(&body)
                .map(AsyncOutcome::Final)
                .map_err(|e: ManifestError| TransportError::Protocol(e.to_string()))
        }
        StatusCode::ACCEPTED => {
            let content_location = header_str(&headers, &CONTENT_LOCATION);
            let progress = header_str(&headers, "x-progress");
            if let Some(progress) = &progress {
                debug!(progress, "export still in progress");
            }
            let retry_after = retry_after_duration(&headers);
            Ok(AsyncOutcome::Accepted {
                content_location,
                progress,
                retry_after,
            })
        }
        other if other.is_server_error() => {
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            let retry_after = retry_after_duration(&headers);
            if let Some(code) = operation_outcome_issue_code(&body) {
                if is_transient_code(&code) {
                    return Ok(AsyncOutcome::Transient {
                        status: other.as_u16(),
                        outcome_digest: operation_outcome_digest(&body),
                        retry_after,
                    });
                }
            }
            Err(TransportError::Http {
                status: other.as_u16(),
                outcome_digest: operation_outcome_digest(&body),
                retry_after,
            })
        }
        other => {
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            Err(TransportError::Http {
                status: other.as_u16(),
                outcome_digest: operation_outcome_digest(&body),
                retry_after: retry_after_duration(&headers),
            })
        }
    }
}

fn header_str(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after_duration(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

const TRANSIENT_ISSUE_CODES: &[&str] = &["transient", "throttled", "timeout"];

fn is_transient_code(code: &str) -> bool {
    TRANSIENT_ISSUE_CODES.contains(&code)
}

fn operation_outcome_issue_code(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("issue")?
        .as_array()?
        .first()?
        .get("code")?
        .as_str()
        .map(str::to_string)
}

fn operation_outcome_digest(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let issues = value.get("issue")?.as_array()?;
    let digest = issues
        .iter()
        .filter_map(|issue| {
            let code = issue.get("code")?.as_str()?;
            let diagnostics = issue.get("diagnostics").and_then(|d| d.as_str());
            Some(match diagnostics {
                Some(d) => format!("{code}: {d}"),
                None => code.to_string(),
            })
        })
        .collect::<Vec<_>>()
        .join("; ");
    if digest.is_empty() {
        warn!("OperationOutcome body had no readable issue entries");
        None
    } else {
        Some(digest)
    }
}
