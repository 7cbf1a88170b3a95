//! Configuration and validation (C9).
//!
//! Construction and validation are deliberately decoupled: [`validate`] is a
//! pure function over a draft builder, and [`ExportConfigBuilder::build`]
//! short-circuits into a [`ConfigError`] on any violation rather than
//! performing any I/O against an invalid configuration.

mod associated_data;
mod async_config;
mod auth_config;
mod http_client_config;
mod level;
pub mod request;
mod validation;

pub use associated_data::{render_associated_data, AssociatedData};
pub use async_config::AsyncConfig;
pub use auth_config::AuthConfig;
pub use http_client_config::HttpClientConfig;
pub use level::Level;
pub use request::ExportRequest;
pub use validation::{format_violations, validate, Violation};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Error building an [`ExportConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Validation found one or more violations.
    #[error("invalid configuration: {}", format_violations(.0))]
    Invalid(Vec<Violation>),
}

/// A fully validated export configuration, ready to drive the orchestrator.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// The request to kick off.
    pub request: ExportRequest,
    /// Directory downloaded files are written into. Must not already
    /// exist at the time [`crate::orchestrator::export`] runs.
    pub output_dir: PathBuf,
    /// File extension appended to downloaded NDJSON files (without the
    /// leading dot). Defaults to `"ndjson"`.
    pub output_extension: String,
    /// The FHIR server's base endpoint.
    pub fhir_endpoint_url: Url,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Poll-loop pacing configuration.
    pub async_config: AsyncConfig,
    /// Transport-level configuration.
    pub http_client: HttpClientConfig,
    /// Worker pool width for the download phase. Must be `>= 1`.
    pub max_concurrent_downloads: usize,
    /// Global wall-clock deadline. `None` means no deadline.
    pub timeout: Option<Duration>,
}

/// Draft configuration under construction. Every field is optional/raw
/// until [`ExportConfigBuilder::build`] validates and converts it.
#[derive(Debug, Clone, Default)]
pub struct ExportConfigBuilder {
    pub(crate) request: Option<ExportRequest>,
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) output_extension: String,
    pub(crate) fhir_endpoint_url: Option<String>,
    pub(crate) auth: AuthConfig,
    pub(crate) async_config: AsyncConfig,
    pub(crate) http_client: HttpClientConfig,
    pub(crate) max_concurrent_downloads: usize,
    pub(crate) timeout: Option<Duration>,
}

impl ExportConfigBuilder {
    /// Starts a new draft with every default taken from the individual
    /// sub-configs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request: None,
            output_dir: None,
            output_extension: "ndjson".to_string(),
            fhir_endpoint_url: None,
            auth: AuthConfig::default(),
            async_config: AsyncConfig::default(),
            http_client: HttpClientConfig::default(),
            max_concurrent_downloads: 4,
            timeout: None,
        }
    }

    /// Sets the export request.
    #[must_use]
    pub fn request(mut self, request: ExportRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Sets the destination directory.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Overrides the default `ndjson` output extension.
    #[must_use]
    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = ext.into();
        self
    }

    /// Sets the FHIR server's base endpoint (validated at `build()`).
    #[must_use]
    pub fn fhir_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.fhir_endpoint_url = Some(url.into());
        self
    }

    /// Replaces the whole auth configuration.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Convenience: toggles `authConfig.enabled` without constructing a
    /// whole `AuthConfig`.
    #[must_use]
    pub fn auth_enabled(mut self, enabled: bool) -> Self {
        self.auth.enabled = enabled;
        self
    }

    /// Replaces the poll-pacing configuration.
    #[must_use]
    pub fn async_config(mut self, config: AsyncConfig) -> Self {
        self.async_config = config;
        self
    }

    /// Replaces the HTTP transport configuration.
    #[must_use]
    pub fn http_client(mut self, config: HttpClientConfig) -> Self {
        self.http_client = config;
        self
    }

    /// Sets the download worker pool width.
    #[must_use]
    pub fn max_concurrent_downloads(mut self, n: usize) -> Self {
        self.max_concurrent_downloads = n;
        self
    }

    /// Sets the global wall-clock deadline. `None` means unbounded.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the draft and, if valid, converts it into a usable
    /// [`ExportConfig`]. All violations are reported together; none of the
    /// network or filesystem I/O this configuration would eventually drive
    /// happens before this call succeeds.
    pub fn build(self) -> Result<ExportConfig, ConfigError> {
        let violations = validate(&self);
        if !violations.is_empty() {
            return Err(ConfigError::Invalid(violations));
        }

        // Unwraps below are safe: validate() would have reported a
        // violation for each of these if they were absent/invalid.
        #[allow(clippy::unwrap_used, clippy::expect_used)]
        let fhir_endpoint_url = Url::parse(self.fhir_endpoint_url.as_ref().unwrap())
            .expect("validated URL must parse");
        #[allow(clippy::unwrap_used)]
        let request = self.request.unwrap();

        Ok(ExportConfig {
            request,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            output_extension: self.output_extension,
            fhir_endpoint_url,
            auth: self.auth,
            async_config: self.async_config,
            http_client: self.http_client,
            max_concurrent_downloads: self.max_concurrent_downloads,
            timeout: self.timeout,
        })
    }
}
