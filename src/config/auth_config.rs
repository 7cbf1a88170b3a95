//! Authentication configuration (feeds the token credential provider, C4).

use std::time::Duration;

/// How the client authenticates with the FHIR server's token endpoint.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Whether authentication is enabled at all. When `false`, all other
    /// fields are ignored and the transport sends unauthenticated requests.
    pub enabled: bool,
    /// The OAuth2 `client_id`. Required when `enabled`.
    pub client_id: Option<String>,
    /// Symmetric client secret. Exactly one of this or `private_key_jwk`
    /// must be set when `enabled`.
    pub client_secret: Option<String>,
    /// Asymmetric signing key (a JWK, as parsed JSON). Exactly one of this
    /// or `client_secret` must be set when `enabled`.
    pub private_key_jwk: Option<serde_json::Value>,
    /// Requested OAuth2 scope string.
    pub scope: Option<String>,
    /// Discover the token endpoint via SMART configuration rather than
    /// using `token_endpoint` verbatim.
    pub use_smart: bool,
    /// Explicit token endpoint, used when `use_smart` is `false`.
    pub token_endpoint: Option<String>,
    /// Send symmetric credentials as form fields (`true`) or as an
    /// `Authorization: Basic` header (`false`).
    pub use_form_for_basic_auth: bool,
    /// Safety margin before a cached token is considered stale and
    /// refreshed. Must be `>= 0`.
    pub token_expiry_tolerance: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: None,
            client_secret: None,
            private_key_jwk: None,
            scope: None,
            use_smart: true,
            token_endpoint: None,
            use_form_for_basic_auth: true,
            token_expiry_tolerance: Duration::from_secs(30),
        }
    }
}
