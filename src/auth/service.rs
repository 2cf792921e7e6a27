// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Wallet-signature login and session verification.

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{debug, warn};

use crate::chain::signature::verify_signature;
use crate::models::User;
use crate::storage::MirrorStore;

use super::challenge::validate_challenge;
use super::error::AuthServiceError;
use super::session::SessionKeys;

/// Authenticates wallets by signature and mints session tokens.
///
/// Login is the only write path into the user table; everything else the
/// server knows about a wallet arrives through chain synchronization.
pub struct AuthService {
    store: Arc<MirrorStore>,
    sessions: SessionKeys,
}

impl AuthService {
    pub fn new(store: Arc<MirrorStore>, sessions: SessionKeys) -> Self {
        Self { store, sessions }
    }

    /// Prove control of `wallet_address` and mint a session token.
    ///
    /// The caller must present a signature over `challenge_message` (a
    /// `revibe-login:<nonce>` string) produced by the wallet's key. On the
    /// first successful login for a wallet a user record is created; later
    /// logins reuse it.
    ///
    /// Every denial surfaces as [`AuthServiceError::InvalidSignature`] or
    /// [`AuthServiceError::InvalidChallenge`], which the HTTP layer collapses
    /// into one generic response.
    pub fn login(
        &self,
        wallet_address: &str,
        challenge_message: &str,
        signature_hex: &str,
    ) -> Result<(String, User), AuthServiceError> {
        let address: Address = wallet_address.parse().map_err(|_| {
            debug!(wallet = wallet_address, "login rejected: unparseable address");
            AuthServiceError::InvalidSignature
        })?;

        validate_challenge(challenge_message)?;

        let signature = alloy::hex::decode(signature_hex)
            .map_err(|_| AuthServiceError::InvalidSignature)?;

        match verify_signature(address, challenge_message.as_bytes(), &signature) {
            Ok(true) => {}
            Ok(false) => {
                debug!(wallet = %address, "login rejected: signature does not match wallet");
                return Err(AuthServiceError::InvalidSignature);
            }
            Err(e) => {
                debug!(wallet = %address, error = %e, "login rejected: malformed signature");
                return Err(AuthServiceError::InvalidSignature);
            }
        }

        let (user, created) = self
            .store
            .find_or_create_user(address)
            .map_err(|e| AuthServiceError::Persistence(e.to_string()))?;
        if created {
            debug!(wallet = %address, user_id = %user.id, "created user on first login");
        }

        let token = self.sessions.issue(&user.id)?;
        Ok((token, user))
    }

    /// Resolve a session token back to its user.
    pub fn verify_session(&self, token: &str) -> Result<User, AuthServiceError> {
        let claims = self.sessions.validate(token)?;

        match self.store.get_user(&claims.sub) {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                warn!(user_id = %claims.sub, "valid token for a missing user");
                Err(AuthServiceError::SubjectNotFound)
            }
            Err(e) => Err(AuthServiceError::Persistence(e.to_string())),
        }
    }
}
