// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 session tokens.
//!
//! Tokens are stateless: nothing is persisted, and every authenticated
//! request re-verifies signature and expiry.

use alloy::primitives::Address;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Session lifetime (12 hours).
pub const SESSION_TTL_SECS: i64 = 12 * 60 * 60;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account identifier.
    pub sub: String,
    /// Primary address at issue time. May be absent for records awaiting repair.
    #[serde(default)]
    pub address: Option<String>,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Session verification failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session token has expired")]
    Expired,

    #[error("session token signature is invalid")]
    InvalidSignature,

    #[error("session token is malformed")]
    Malformed,

    #[error("failed to sign session token: {0}")]
    Signing(String),
}

/// Issues and verifies session tokens with the server secret.
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(SESSION_TTL_SECS),
        }
    }

    /// Override the token lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issue a token for `account_id`.
    pub fn issue(&self, account_id: &str, address: Option<Address>) -> Result<String, SessionError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: account_id.to_string(),
            address: address.map(|a| a.to_checksum(None)),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                ErrorKind::InvalidSignature => SessionError::InvalidSignature,
                _ => SessionError::Malformed,
            })
    }
}
