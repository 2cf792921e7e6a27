// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Authentication service errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors from login and session verification.
///
/// Login denials (`InvalidSignature`, `InvalidChallenge`) collapse into one
/// generic HTTP message so callers cannot distinguish a wrong signature from
/// an unknown wallet. Session verification keeps its variants distinct so
/// the HTTP layer can report the correct denial reason.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    /// Signature does not prove control of the claimed wallet.
    #[error("signature verification failed")]
    InvalidSignature,

    /// Challenge message is not in the expected `revibe-login:<nonce>` form.
    #[error("malformed login challenge")]
    InvalidChallenge,

    /// Session token could not be decoded or its signature is invalid.
    #[error("session token is malformed")]
    TokenMalformed,

    /// Session token expired.
    #[error("session token has expired")]
    TokenExpired,

    /// Token is valid but its subject no longer exists.
    #[error("session subject no longer exists")]
    SubjectNotFound,

    /// The identity store failed.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthServiceError {
    /// Stable machine-readable code for the HTTP response.
    pub fn error_code(&self) -> &'static str {
        match self {
            // One code for all login denials: no address enumeration.
            AuthServiceError::InvalidSignature | AuthServiceError::InvalidChallenge => {
                "invalid_credentials"
            }
            AuthServiceError::TokenMalformed => "token_malformed",
            AuthServiceError::TokenExpired => "token_expired",
            AuthServiceError::SubjectNotFound => "subject_not_found",
            AuthServiceError::Persistence(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthServiceError::InvalidSignature
            | AuthServiceError::InvalidChallenge
            | AuthServiceError::TokenMalformed
            | AuthServiceError::TokenExpired
            | AuthServiceError::SubjectNotFound => StatusCode::UNAUTHORIZED,
            AuthServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-visible message. Login denials share one generic message.
    fn public_message(&self) -> String {
        match self {
            AuthServiceError::InvalidSignature | AuthServiceError::InvalidChallenge => {
                "invalid credentials".to_string()
            }
            AuthServiceError::Persistence(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
