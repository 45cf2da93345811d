//! Credential checks for the streaming and batch endpoints.
//!
//! The stream endpoint accepts a static shared token and/or short-lived
//! HMAC-signed tokens of the form `base64(timestamp:subject):base64(signature)`.
//! With neither configured, stream auth is disabled. The batch endpoint has
//! its own API key.

use crate::defaults;
use crate::error::{LivescribeError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

fn unauthorized(message: &str) -> LivescribeError {
    LivescribeError::Unauthorized {
        message: message.to_string(),
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn mac(secret: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret)
        .map_err(|e| LivescribeError::Other(format!("Invalid token secret: {e}")))
}

/// Mint a signed stream token for `subject` at time `now`.
pub fn issue_token(secret: &str, subject: &str, now: u64) -> Result<String> {
    if secret.is_empty() {
        return Err(LivescribeError::ConfigInvalidValue {
            key: "auth.token_secret".to_string(),
            message: "a secret is required to issue tokens".to_string(),
        });
    }
    if subject.trim().is_empty() {
        return Err(LivescribeError::Other(
            "token subject must not be empty".to_string(),
        ));
    }
    let payload = format!("{now}:{subject}");
    let mut signer = mac(secret.as_bytes())?;
    signer.update(payload.as_bytes());
    let signature = signer.finalize().into_bytes();
    Ok(format!("{}:{}", STANDARD.encode(payload), STANDARD.encode(signature)))
}

/// Check a signed token and return its subject.
pub fn verify_signed(secret: &[u8], token: &str, now: u64, ttl_secs: u64) -> Result<String> {
    let (payload_b64, signature_b64) = token
        .split_once(':')
        .ok_or_else(|| unauthorized("malformed token"))?;
    let payload = STANDARD
        .decode(payload_b64)
        .map_err(|_| unauthorized("malformed token"))?;
    let signature = STANDARD
        .decode(signature_b64)
        .map_err(|_| unauthorized("malformed token"))?;

    let mut verifier = mac(secret)?;
    verifier.update(&payload);
    verifier
        .verify_slice(&signature)
        .map_err(|_| unauthorized("invalid token signature"))?;

    let payload = String::from_utf8(payload).map_err(|_| unauthorized("malformed token"))?;
    let (timestamp, subject) = payload
        .split_once(':')
        .ok_or_else(|| unauthorized("malformed token"))?;
    let issued: u64 = timestamp
        .parse()
        .map_err(|_| unauthorized("malformed token timestamp"))?;

    if issued > now + defaults::TOKEN_CLOCK_SKEW_SECS {
        return Err(unauthorized("token issued in the future"));
    }
    if now.saturating_sub(issued) > ttl_secs {
        return Err(unauthorized("token expired"));
    }
    Ok(subject.to_string())
}

/// Who a stream connection authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Auth is disabled.
    Anonymous,
    /// Static shared token.
    SharedToken,
    /// Signed token for this subject.
    Subject(String),
}

/// Stream endpoint credential policy.
#[derive(Debug, Clone, Default)]
pub struct StreamAuth {
    static_token: Option<String>,
    secret: Option<Vec<u8>>,
    ttl_secs: u64,
}

impl StreamAuth {
    /// Empty strings count as "not configured".
    pub fn new(static_token: Option<&str>, secret: Option<&str>, ttl_secs: u64) -> Self {
        Self {
            static_token: static_token
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            secret: secret.filter(|s| !s.is_empty()).map(|s| s.as_bytes().to_vec()),
            ttl_secs,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.static_token.is_some() || self.secret.is_some()
    }

    /// Check a presented credential against the current time.
    pub fn verify(&self, presented: Option<&str>) -> Result<Identity> {
        self.verify_at(presented, unix_now())
    }

    pub fn verify_at(&self, presented: Option<&str>, now: u64) -> Result<Identity> {
        if !self.is_enabled() {
            return Ok(Identity::Anonymous);
        }
        let token = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized("missing token"))?;

        if let Some(expected) = &self.static_token
            && constant_time_eq(expected.as_bytes(), token.as_bytes())
        {
            return Ok(Identity::SharedToken);
        }
        match &self.secret {
            Some(secret) => verify_signed(secret, token, now, self.ttl_secs).map(Identity::Subject),
            None => Err(unauthorized("invalid token")),
        }
    }
}

/// Batch endpoint API key. `None` disables the check.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuth {
    key: Option<String>,
}

impl ApiKeyAuth {
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(str::to_string),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn verify(&self, presented: Option<&str>) -> Result<()> {
        let Some(expected) = &self.key else {
            return Ok(());
        };
        match presented.map(str::trim) {
            Some(key) if constant_time_eq(expected.as_bytes(), key.as_bytes()) => Ok(()),
            Some(_) => Err(unauthorized("invalid API key")),
            None => Err(unauthorized("missing API key")),
        }
    }
}
