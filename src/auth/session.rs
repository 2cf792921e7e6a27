// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Stateless session tokens.
//!
//! A session is a signed, time-bounded claim binding a local user id to an
//! expiry instant. There is no server-side session store: validity is solely
//! a function of the HMAC signature and the expiry.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::AuthServiceError;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Local user identifier.
    pub sub: String,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

/// Issues and validates session tokens with a shared HMAC secret.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity: Duration,
}

impl SessionKeys {
    /// Build from the configured signing secret and validity window.
    pub fn new(secret: &str, validity: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validity,
        }
    }

    /// Mint a token for `subject`, valid from now for the configured window.
    pub fn issue(&self, subject: &str) -> Result<String, AuthServiceError> {
        self.issue_at(subject, Utc::now())
    }

    /// Mint a token with an explicit issue instant. Exposed for expiry tests.
    pub fn issue_at(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthServiceError> {
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthServiceError::Persistence(format!("token encoding failed: {e}")))
    }

    /// Validate signature and expiry, returning the embedded claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, AuthServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; the default leeway would accept stale tokens.
        validation.leeway = 0;
        validation.validate_aud = false;

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthServiceError::TokenExpired,
                _ => AuthServiceError::TokenMalformed,
            })
    }
}
