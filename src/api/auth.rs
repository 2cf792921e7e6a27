// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};

use crate::{
    auth::AuthServiceError,
    models::{LoginRequest, LoginResponse, User},
    state::AppState,
};

/// Pull the bearer token out of the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthServiceError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthServiceError::TokenMalformed)
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Wallet authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthServiceError> {
    let (token, user) = state.auth.login(
        &request.wallet_address,
        &request.challenge_message,
        &request.signature,
    )?;
    Ok(Json(LoginResponse { token, user }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session is valid", body = User),
        (status = 401, description = "Session is missing, malformed or expired")
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, AuthServiceError> {
    let token = bearer_token(&headers)?;
    let user = state.auth.verify_session(token)?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alloy::hex;
    use axum::http::HeaderValue;
    use chrono::Duration;
    use k256::ecdsa::SigningKey;
    use tempfile::TempDir;

    use crate::auth::{AuthService, SessionKeys};
    use crate::chain::signature::{address_from_verifying_key, sign_message};
    use crate::storage::MirrorStore;

    const CHALLENGE: &str = "revibe-login:nonce123";

    fn state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MirrorStore::open(&dir.path().join("mirror.redb")).unwrap());
        let auth = Arc::new(AuthService::new(
            store.clone(),
            SessionKeys::new("test-secret", Duration::hours(24)),
        ));
        (AppState::new(auth, store), dir)
    }

    fn login_request() -> LoginRequest {
        let key = SigningKey::from_bytes(&[0x42u8; 32].into()).unwrap();
        let address = address_from_verifying_key(key.verifying_key());
        let signature = sign_message(CHALLENGE.as_bytes(), &key).unwrap();
        LoginRequest {
            wallet_address: format!("{address:#x}"),
            challenge_message: CHALLENGE.into(),
            signature: format!("0x{}", hex::encode(signature)),
        }
    }

    #[tokio::test]
    async fn login_then_verify_round_trip() {
        let (state, _dir) = state();

        let Json(response) = login(State(state.clone()), Json(login_request()))
            .await
            .expect("login succeeds");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", response.token)).unwrap(),
        );
        let Json(user) = verify(State(state), headers)
            .await
            .expect("verification succeeds");
        assert_eq!(user.id, response.user.id);
    }

    #[tokio::test]
    async fn verify_without_bearer_header_is_rejected() {
        let (state, _dir) = state();

        let err = verify(State(state.clone()), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthServiceError::TokenMalformed));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let err = verify(State(state), headers).await.unwrap_err();
        assert!(matches!(err, AuthServiceError::TokenMalformed));
    }

    #[tokio::test]
    async fn login_with_tampered_signature_is_rejected() {
        let (state, _dir) = state();
        let mut request = login_request();
        // Flip one nibble inside the r component.
        let mut bytes = request.signature.into_bytes();
        bytes[10] = if bytes[10] == b'0' { b'1' } else { b'0' };
        request.signature = String::from_utf8(bytes).unwrap();

        let err = login(State(state), Json(request)).await.unwrap_err();
        assert!(matches!(err, AuthServiceError::InvalidSignature));
    }
}
