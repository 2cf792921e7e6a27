// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Wallet-based authentication.
//!
//! A wallet proves its identity by signing a `revibe-login:<nonce>` challenge
//! with its secp256k1 key. A valid signature maps to a local user record and
//! a stateless HS256 session token.

pub mod challenge;
pub mod error;
pub mod service;
pub mod session;

pub use challenge::{validate_challenge, CHALLENGE_PREFIX};
pub use error::AuthServiceError;
pub use service::AuthService;
pub use session::{SessionClaims, SessionKeys};
