//! SMART-on-FHIR token acquisition, caching, and refresh (C4).

mod jwt;

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{AuthConfig, ConfigError, Violation};
use crate::request_builder::with_trailing_slash;

/// Error acquiring or refreshing a bearer token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// SMART discovery or the token endpoint returned a non-2xx status.
    #[error("token endpoint returned HTTP {status}: {body}")]
    Http {
        /// The response status.
        status: u16,
        /// A truncated response body, for diagnostics.
        body: String,
    },

    /// A network-level failure reaching the discovery or token endpoint.
    #[error("network error during token acquisition: {0}")]
    Network(#[from] reqwest::Error),

    /// SMART discovery succeeded but `token_endpoint` was absent.
    #[error("SMART configuration at {0} is missing token_endpoint")]
    MissingTokenEndpoint(String),

    /// The configured token endpoint or discovery URL was not a valid URL.
    #[error("invalid token endpoint URL: {0}")]
    InvalidUrl(String),

    /// The `privateKeyJWK` value did not match the expected signing-key shape.
    #[error("malformed private key JWK: {0}")]
    MalformedJwk(#[source] serde_json::Error),

    /// The JWK named an algorithm this client cannot sign with.
    #[error("unsupported JWT signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signing the client-assertion JWT failed.
    #[error("failed to sign client assertion: {0}")]
    Jwt(#[source] jsonwebtoken::errors::Error),

    /// The token response body could not be parsed.
    #[error("malformed token response: {0}")]
    MalformedTokenResponse(#[source] serde_json::Error),
}

/// A bearer token and the instant it expires.
#[derive(Debug, Clone)]
pub struct TokenCredential {
    /// The opaque bearer token value.
    pub value: String,
    /// When the token stops being valid.
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
struct SmartConfiguration {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Acquires, caches, and refreshes a bearer token for one `(endpoint,
/// authConfig)` pair. Refresh is serialized: concurrent callers seeing a
/// stale token block on a single in-flight refresh rather than each issuing
/// their own request.
pub struct TokenProvider {
    client: Client,
    config: AuthConfig,
    fhir_endpoint: Url,
    cached: Mutex<Option<TokenCredential>>,
}

impl TokenProvider {
    /// Creates a provider for the given endpoint and auth configuration.
    ///
    /// Validates `config.private_key_jwk`'s signing algorithm eagerly, since
    /// that can only be checked once the JWK is parsed, and this is the
    /// first point after `build()` where that's possible. An unsupported
    /// algorithm surfaces as a `ConfigError` here rather than lazily as an
    /// `AuthError` on the first token refresh.
    pub fn new(
        client: Client,
        config: AuthConfig,
        fhir_endpoint: Url,
    ) -> Result<Arc<Self>, ConfigError> {
        if config.enabled {
            if let Some(jwk) = &config.private_key_jwk {
                if let Err(message) = jwt::validate_jwk_algorithm(jwk) {
                    return Err(ConfigError::Invalid(vec![Violation {
                        path: "authConfig.privateKeyJWK".to_string(),
                        message,
                    }]));
                }
            }
        }
        Ok(Arc::new(Self {
            client,
            config,
            fhir_endpoint,
            cached: Mutex::new(None),
        }))
    }

    /// Returns a bearer token valid for at least `tokenExpiryTolerance`,
    /// refreshing if necessary. Returns `None` when authentication is
    /// disabled.
    #[instrument(skip(self))]
    pub async fn token(&self) -> Result<Option<String>, AuthError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let mut guard = self.cached.lock().await;
        let now = OffsetDateTime::now_utc();
        let needs_refresh = match &*guard {
            Some(cred) => cred.expires_at - now <= self.config.token_expiry_tolerance,
            None => true,
        };
        if needs_refresh {
            debug!("refreshing bearer token");
            let fresh = self.refresh().await?;
            *guard = Some(fresh);
        }
        Ok(guard.as_ref().map(|cred| cred.value.clone()))
    }

    /// Whether `url` shares scheme, host, and port with the FHIR endpoint —
    /// the narrowed same-origin rule under which download URLs also receive
    /// the bearer token.
    #[must_use]
    pub fn is_same_origin(&self, url: &Url) -> bool {
        self.fhir_endpoint.scheme() == url.scheme()
            && self.fhir_endpoint.host_str() == url.host_str()
            && self.fhir_endpoint.port_or_known_default() == url.port_or_known_default()
    }

    async fn refresh(&self) -> Result<TokenCredential, AuthError> {
        let token_endpoint = self.resolve_token_endpoint().await?;
        let now = OffsetDateTime::now_utc();

        let request = if let Some(jwk) = &self.config.private_key_jwk {
            self.asymmetric_request(&token_endpoint, jwk, now)?
        } else {
            self.symmetric_request(&token_endpoint)
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(AuthError::Network)?;
        Ok(TokenCredential {
            value: body.access_token,
            expires_at: now + time::Duration::seconds(body.expires_in),
        })
    }

    fn symmetric_request(&self, token_endpoint: &Url) -> reqwest::RequestBuilder {
        let client_id = self.config.client_id.clone().unwrap_or_default();
        let client_secret = self.config.client_secret.clone().unwrap_or_default();
        let scope = self.config.scope.clone().unwrap_or_default();

        if self.config.use_form_for_basic_auth {
            let mut form = vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ];
            if !scope.is_empty() {
                form.push(("scope", scope.as_str()));
            }
            self.client.post(token_endpoint.clone()).form(&form)
        } else {
            let mut form = vec![("grant_type", "client_credentials")];
            if !scope.is_empty() {
                form.push(("scope", scope.as_str()));
            }
            self.client
                .post(token_endpoint.clone())
                .basic_auth(client_id, Some(client_secret))
                .form(&form)
        }
    }

    fn asymmetric_request(
        &self,
        token_endpoint: &Url,
        jwk: &serde_json::Value,
        now: OffsetDateTime,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        let client_id = self.config.client_id.clone().unwrap_or_default();
        let assertion = jwt::build_client_assertion(
            jwk,
            &client_id,
            token_endpoint.as_str(),
            now.unix_timestamp(),
        )?;
        let scope = self.config.scope.clone().unwrap_or_default();
        let mut form = vec![
            ("grant_type", "client_credentials"),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
            ),
            ("client_assertion", assertion.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }
        Ok(self.client.post(token_endpoint.clone()).form(&form))
    }

    #[instrument(skip(self))]
    async fn resolve_token_endpoint(&self) -> Result<Url, AuthError> {
        if !self.config.use_smart {
            let raw = self.config.token_endpoint.clone().unwrap_or_default();
            return Url::parse(&raw).map_err(|_| AuthError::InvalidUrl(raw));
        }

        let base = with_trailing_slash(&self.fhir_endpoint);
        let discovery_url = base
            .join(".well-known/smart-configuration")
            .map_err(|_| AuthError::InvalidUrl(self.fhir_endpoint.to_string()))?;
        let response = self.client.get(discovery_url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        let config: SmartConfiguration = response.json().await.map_err(AuthError::Network)?;
        Url::parse(&config.token_endpoint).map_err(|_| {
            warn!(discovery_url = %discovery_url, "SMART configuration missing a valid token_endpoint");
            AuthError::MissingTokenEndpoint(discovery_url.to_string())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoint(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_origin_ignores_path() {
        let provider_endpoint = endpoint("http://srv/fhir");
        let disabled_config = AuthConfig {
            enabled: false,
            ..AuthConfig::default()
        };
        let provider = TokenProvider::new(Client::new(), disabled_config, provider_endpoint).unwrap();
        assert!(provider.is_same_origin(&endpoint("http://srv/d/1")));
        assert!(!provider.is_same_origin(&endpoint("http://cdn.example/d/1")));
        assert!(!provider.is_same_origin(&endpoint("https://srv/d/1")));
    }

    #[tokio::test]
    async fn disabled_auth_returns_no_token() {
        let provider = TokenProvider::new(
            Client::new(),
            AuthConfig {
                enabled: false,
                ..AuthConfig::default()
            },
            endpoint("http://srv/fhir"),
        )
        .unwrap();
        assert_eq!(provider.token().await.unwrap(), None);
    }

    #[test]
    fn unsupported_algorithm_rejected_at_construction() {
        let config = AuthConfig {
            enabled: true,
            client_id: Some("client1".to_string()),
            private_key_jwk: Some(serde_json::json!({"alg": "HS256", "pem": "irrelevant"})),
            ..AuthConfig::default()
        };
        let err = TokenProvider::new(Client::new(), config, endpoint("http://srv/fhir"))
            .err()
            .unwrap();
        assert!(matches!(err, crate::config::ConfigError::Invalid(_)));
    }

    #[test]
    fn smart_discovery_url_keeps_endpoint_path() {
        // A bare Url::join without a trailing slash would drop "fhir" from
        // the path entirely; discovery must stay under the endpoint's path.
        let base = with_trailing_slash(&endpoint("http://srv/fhir"));
        let discovery = base.join(".well-known/smart-configuration").unwrap();
        assert_eq!(
            discovery.as_str(),
            "http://srv/fhir/.well-known/smart-configuration"
        );
    }
}
