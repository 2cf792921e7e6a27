// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Chain integration: client adapter, contract interface, event decoding,
//! and wallet signature verification.

pub mod client;
pub mod contract;
pub mod events;
pub mod signature;

pub use client::{ChainClient, ChainClientError, LogNotice, LogSubscription, RpcChainClient};
pub use events::{decode_event, ChainEvent, DecodedEvent, EventDecodeError, EventId};
pub use signature::{recover_address, sign_message, verify_signature, SignatureError};
