//! HS256 signed tokens proving a request originates from this proxy.
//!
//! Tokens are compact JWTs (`header.claims.signature`, base64url without
//! padding). The issuer is always [`ISSUER`]; verification rejects any
//! other algorithm, issuer or an expired token.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

use crate::security::secret::{SecretError, SecretProvider};

type HmacSha256 = Hmac<Sha256>;

/// Issuer claim stamped on every token.
pub const ISSUER: &str = "accel-proxy";

/// How long a freshly signed token stays valid.
pub const TOKEN_TTL: Duration = Duration::from_secs(60);

const ALGORITHM: &str = "HS256";

/// Errors signing or verifying tokens.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("malformed token")]
    Malformed,

    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("signature mismatch")]
    BadSignature,

    #[error("unexpected issuer {0:?}")]
    WrongIssuer(String),

    #[error("token expired")]
    Expired,

    #[error("invalid signing key")]
    InvalidKey,

    #[error("token json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Token claims. `iss` is overwritten with [`ISSUER`] on signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Claims issued now and valid for [`TOKEN_TTL`].
    pub fn new() -> Self {
        let now = unix_now();
        Self {
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + TOKEN_TTL.as_secs(),
            extra: Map::new(),
        }
    }

    /// Add a private claim.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl Default for Claims {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign `claims` with `secret`, forcing the issuer.
pub fn sign(secret: &[u8], mut claims: Claims) -> Result<String, TokenError> {
    claims.iss = ISSUER.to_string();
    let header = Header {
        alg: ALGORITHM.to_string(),
        typ: Some("JWT".to_string()),
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?),
    );
    let signature = mac(secret, &signing_input)?.finalize().into_bytes();
    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify a token against `secret` and return its claims.
pub fn verify(secret: &[u8], token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let header: Header = serde_json::from_slice(&decode_part(header)?)?;
    if header.alg != ALGORITHM {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    }

    let signing_input_len = token.len() - signature.len() - 1;
    mac(secret, &token[..signing_input_len])?
        .verify_slice(&decode_part(signature)?)
        .map_err(|_| TokenError::BadSignature)?;

    let claims: Claims = serde_json::from_slice(&decode_part(claims)?)?;
    if claims.iss != ISSUER {
        return Err(TokenError::WrongIssuer(claims.iss));
    }
    if claims.exp < unix_now() {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

impl SecretProvider {
    /// Sign claims with this provider's secret.
    pub fn signed_token(&self, claims: Claims) -> Result<String, TokenError> {
        sign(&self.bytes()?, claims)
    }

    /// Verify a token with this provider's secret.
    pub fn verify_token(&self, token: &str) -> Result<Claims, TokenError> {
        verify(&self.bytes()?, token)
    }
}

fn mac(secret: &[u8], input: &str) -> Result<HmacSha256, TokenError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
    mac.update(input.as_bytes());
    Ok(mac)
}

fn decode_part(part: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD.decode(part).map_err(|_| TokenError::Malformed)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
