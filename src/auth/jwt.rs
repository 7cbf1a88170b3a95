//! Client-assertion JWT construction for asymmetric SMART authentication.
//!
//! The signing key is carried as a JWK-shaped JSON value whose `alg` field
//! selects the signature algorithm; the private key material itself travels
//! as a PKCS8 PEM string under `pem`, since deriving a signing key directly
//! from raw JWK `n`/`e`/`d` components needs key-format crates outside this
//! crate's otherwise teacher-aligned dependency stack.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AuthError;

#[derive(Debug, Deserialize)]
struct SigningJwk {
    alg: String,
    pem: String,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    sub: String,
    aud: String,
    jti: String,
    exp: i64,
}

/// Builds and signs a `client_assertion` JWT for the asymmetric profile.
///
/// Claims are `{iss=clientId, sub=clientId, aud=tokenEndpoint, jti=<random>,
/// exp=now+5min}`, signed with the algorithm named in the JWK.
pub fn build_client_assertion(
    jwk: &Value,
    client_id: &str,
    token_endpoint: &str,
    now_unix: i64,
) -> Result<String, AuthError> {
    let signing_jwk: SigningJwk =
        serde_json::from_value(jwk.clone()).map_err(AuthError::MalformedJwk)?;
    let algorithm = parse_algorithm(&signing_jwk.alg)?;
    let encoding_key = encoding_key_for(algorithm, &signing_jwk.pem)?;

    let claims = Claims {
        iss: client_id.to_string(),
        sub: client_id.to_string(),
        aud: token_endpoint.to_string(),
        jti: random_jti(),
        exp: now_unix + 300,
    };

    let mut header = Header::new(algorithm);
    header.typ = Some("JWT".to_string());
    encode(&header, &claims, &encoding_key).map_err(AuthError::Jwt)
}

fn parse_algorithm(alg: &str) -> Result<Algorithm, AuthError> {
    match alg {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        other => Err(AuthError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Checks that `jwk` names a signature algorithm this client can sign with,
/// without building a full assertion. Used by configuration validation to
/// reject an unsupported algorithm at `build()` rather than at first refresh.
pub(crate) fn validate_jwk_algorithm(jwk: &Value) -> Result<(), String> {
    let signing_jwk: SigningJwk =
        serde_json::from_value(jwk.clone()).map_err(|e| format!("malformed privateKeyJWK: {e}"))?;
    parse_algorithm(&signing_jwk.alg)
        .map(|_| ())
        .map_err(|_| format!("unsupported JWT signing algorithm {:?}", signing_jwk.alg))
}

fn encoding_key_for(algorithm: Algorithm, pem: &str) -> Result<EncodingKey, AuthError> {
    let bytes = pem.as_bytes();
    match algorithm {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            EncodingKey::from_rsa_pem(bytes).map_err(AuthError::Jwt)
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            EncodingKey::from_ec_pem(bytes).map_err(AuthError::Jwt)
        }
        _ => Err(AuthError::UnsupportedAlgorithm(format!("{algorithm:?}"))),
    }
}

fn random_jti() -> String {
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}
