// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Login challenge format.
//!
//! Clients sign a message of the form `revibe-login:<nonce>`. The fixed
//! prefix stops a marketplace login signature from being replayed as a
//! signature over some other protocol's payload.

use super::error::AuthServiceError;

/// Required prefix of every login challenge.
pub const CHALLENGE_PREFIX: &str = "revibe-login:";

/// Longest accepted nonce, in bytes.
const MAX_NONCE_LENGTH: usize = 128;

/// Check that `message` is a well-formed login challenge and return its nonce.
///
/// The nonce must be non-empty, at most [`MAX_NONCE_LENGTH`] bytes, and
/// restricted to printable ASCII without whitespace.
pub fn validate_challenge(message: &str) -> Result<&str, AuthServiceError> {
    let nonce = message
        .strip_prefix(CHALLENGE_PREFIX)
        .ok_or(AuthServiceError::InvalidChallenge)?;

    if nonce.is_empty() || nonce.len() > MAX_NONCE_LENGTH {
        return Err(AuthServiceError::InvalidChallenge);
    }
    if !nonce
        .bytes()
        .all(|b| b.is_ascii_graphic())
    {
        return Err(AuthServiceError::InvalidChallenge);
    }

    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_challenge_yields_nonce() {
        assert_eq!(validate_challenge("revibe-login:nonce123").unwrap(), "nonce123");
        assert_eq!(
            validate_challenge("revibe-login:a1b2-c3d4_e5f6").unwrap(),
            "a1b2-c3d4_e5f6"
        );
    }

    #[test]
    fn missing_or_wrong_prefix_is_rejected() {
        for message in [
            "nonce123",
            "login:nonce123",
            "REVIBE-LOGIN:nonce123",
            " revibe-login:nonce123",
        ] {
            assert!(matches!(
                validate_challenge(message),
                Err(AuthServiceError::InvalidChallenge)
            ));
        }
    }

    #[test]
    fn empty_oversized_and_whitespace_nonces_are_rejected() {
        assert!(validate_challenge("revibe-login:").is_err());
        assert!(validate_challenge(&format!("revibe-login:{}", "x".repeat(129))).is_err());
        assert!(validate_challenge("revibe-login:has space").is_err());
        assert!(validate_challenge("revibe-login:line\nbreak").is_err());
    }

    #[test]
    fn maximum_length_nonce_is_accepted() {
        let message = format!("revibe-login:{}", "x".repeat(128));
        assert!(validate_challenge(&message).is_ok());
    }
}
