// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! # Data Models
//!
//! Mirror records and API request/response structures. All types derive
//! `Serialize`/`Deserialize` (redb rows are stored as JSON, as is the API
//! payload) and `ToSchema` for OpenAPI documentation.
//!
//! Mirror rows (products, orders, authentications) are projections of chain
//! events keyed by their natural on-chain identity; the chain, not these
//! rows, is the source of truth for ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Users
// =============================================================================

/// A marketplace user, identified by their wallet address.
///
/// Users are created on first login; the wallet address is never generated
/// locally, always supplied (and proven by signature).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Local user identifier (UUID).
    pub id: String,
    /// EIP-55 checksummed wallet address.
    pub wallet_address: String,
    /// Display name, if the user has set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Avatar URL, if the user has set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// When the user first logged in.
    pub created_at: DateTime<Utc>,
    /// Last profile update.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Mirror Rows
// =============================================================================

/// Mirrored state of an on-chain product listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    /// On-chain product identifier (decimal string; uint256 on chain).
    pub product_id: String,
    /// Product name as listed.
    pub name: String,
    /// Current price in wei (decimal string).
    pub price: String,
    /// Seller wallet address.
    pub seller: String,
    /// Whether the product is currently listed.
    pub is_listed: bool,
    /// Whether an authenticity determination exists for the product.
    pub is_authenticated: bool,
    /// Block of the last event applied to this row.
    pub last_event_block: u64,
    /// When this row was last written.
    pub updated_at: DateTime<Utc>,
}

/// A completed on-chain sale, keyed by its transaction hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    /// Hash of the buy transaction (natural key).
    pub tx_hash: String,
    /// Product that was bought.
    pub product_id: String,
    /// Buyer wallet address.
    pub buyer: String,
    /// Sale price in wei (decimal string).
    pub price: String,
    /// Block in which the sale was recorded.
    pub block_number: u64,
    /// When the mirror recorded the sale.
    pub completed_at: DateTime<Utc>,
}

/// An authenticity determination for a product.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRecord {
    /// Product the determination applies to (natural key).
    pub product_id: String,
    /// Outcome of the authenticity check.
    pub result: bool,
    /// Transaction that emitted the determination.
    pub tx_hash: String,
    /// Block in which the determination was recorded.
    pub block_number: u64,
    /// When the mirror recorded the determination.
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Auth API Models
// =============================================================================

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Wallet address claiming the login (0x-prefixed hex).
    pub wallet_address: String,
    /// The challenge message that was signed (`revibe-login:<nonce>`).
    pub challenge_message: String,
    /// 65-byte recoverable signature over the challenge, hex encoded.
    pub signature: String,
}

/// Response body for a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Bearer session token.
    pub token: String,
    /// The authenticated (possibly just created) user.
    pub user: User,
}
