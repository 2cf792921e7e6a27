// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! ReVibe Server - Marketplace Chain Sync & Wallet Auth Service
//!
//! This crate keeps an off-chain mirror of the ReVibe marketplace contract
//! consistent with the chain and authenticates users by wallet signature.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Wallet-signature login and session tokens
//! - `chain` - Contract bindings, event decoding, RPC client
//! - `storage` - Embedded mirror of on-chain state (redb)
//! - `sync` - Event synchronizer state machine

pub mod api;
pub mod auth;
pub mod chain;
pub mod config;
pub mod models;
pub mod state;
pub mod storage;
pub mod sync;
