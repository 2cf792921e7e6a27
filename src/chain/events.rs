// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Typed marketplace events decoded from raw chain logs.
//!
//! `(block_number, log_index)` is the single source of truth for event
//! ordering; the synchronizer applies events strictly in that order.

use alloy::{
    primitives::{Address, TxHash, B256, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};

use super::contract::IReVibeMarket;

/// Ordering key for chain events. Totally ordered by block, then in-block
/// log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    pub block_number: u64,
    pub log_index: u64,
}

/// One marketplace state transition, discriminated by event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    ProductListed {
        product_id: U256,
        name: String,
        price: U256,
        seller: Address,
    },
    ProductBought {
        product_id: U256,
        buyer: Address,
        price: U256,
    },
    ProductAuthenticated {
        product_id: U256,
        result: bool,
    },
    PriceUpdated {
        product_id: U256,
        new_price: U256,
    },
}

impl ChainEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::ProductListed { .. } => "ProductListed",
            ChainEvent::ProductBought { .. } => "ProductBought",
            ChainEvent::ProductAuthenticated { .. } => "ProductAuthenticated",
            ChainEvent::PriceUpdated { .. } => "PriceUpdated",
        }
    }
}

/// A decoded event together with its on-chain provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub id: EventId,
    pub tx_hash: TxHash,
    pub event: ChainEvent,
}

/// Errors from turning a raw log into a [`DecodedEvent`].
///
/// Decode failures are never fatal to the synchronizer; unknown shapes are
/// logged and skipped for forward compatibility with contract upgrades.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("log is missing block number, log index, or transaction hash")]
    MissingMetadata,

    #[error("log has no event topic")]
    MissingTopic,

    #[error("unrecognized event topic {0}")]
    UnknownTopic(B256),

    #[error("ABI decode failed for {event}: {reason}")]
    Abi { event: &'static str, reason: String },
}

/// Decode a raw log into a typed marketplace event.
pub fn decode_event(log: &Log) -> Result<DecodedEvent, EventDecodeError> {
    let block_number = log.block_number.ok_or(EventDecodeError::MissingMetadata)?;
    let log_index = log.log_index.ok_or(EventDecodeError::MissingMetadata)?;
    let tx_hash = log
        .transaction_hash
        .ok_or(EventDecodeError::MissingMetadata)?;

    let topic0 = *log
        .topics()
        .first()
        .ok_or(EventDecodeError::MissingTopic)?;

    let event = match topic0 {
        t if t == IReVibeMarket::ProductListed::SIGNATURE_HASH => {
            let decoded = IReVibeMarket::ProductListed::decode_log_data(log.data())
                .map_err(|e| EventDecodeError::Abi {
                    event: "ProductListed",
                    reason: e.to_string(),
                })?;
            ChainEvent::ProductListed {
                product_id: decoded.productId,
                name: decoded.name,
                price: decoded.price,
                seller: decoded.seller,
            }
        }
        t if t == IReVibeMarket::ProductBought::SIGNATURE_HASH => {
            let decoded = IReVibeMarket::ProductBought::decode_log_data(log.data())
                .map_err(|e| EventDecodeError::Abi {
                    event: "ProductBought",
                    reason: e.to_string(),
                })?;
            ChainEvent::ProductBought {
                product_id: decoded.productId,
                buyer: decoded.buyer,
                price: decoded.price,
            }
        }
        t if t == IReVibeMarket::ProductAuthenticated::SIGNATURE_HASH => {
            let decoded = IReVibeMarket::ProductAuthenticated::decode_log_data(log.data())
                .map_err(|e| EventDecodeError::Abi {
                    event: "ProductAuthenticated",
                    reason: e.to_string(),
                })?;
            ChainEvent::ProductAuthenticated {
                product_id: decoded.productId,
                result: decoded.result,
            }
        }
        t if t == IReVibeMarket::PriceUpdated::SIGNATURE_HASH => {
            let decoded = IReVibeMarket::PriceUpdated::decode_log_data(log.data())
                .map_err(|e| EventDecodeError::Abi {
                    event: "PriceUpdated",
                    reason: e.to_string(),
                })?;
            ChainEvent::PriceUpdated {
                product_id: decoded.productId,
                new_price: decoded.newPrice,
            }
        }
        other => return Err(EventDecodeError::UnknownTopic(other)),
    };

    Ok(DecodedEvent {
        id: EventId {
            block_number,
            log_index,
        },
        tx_hash,
        event,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for building raw logs in tests.

    use alloy::primitives::{Address, LogData, TxHash, B256};
    use alloy::rpc::types::Log;

    /// Wrap encoded event data in a raw RPC log with ordering metadata.
    pub fn raw_log(block_number: u64, log_index: u64, tx_seed: u8, data: LogData) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0xc0),
                data,
            },
            block_number: Some(block_number),
            log_index: Some(log_index),
            transaction_hash: Some(TxHash::repeat_byte(tx_seed)),
            ..Default::default()
        }
    }

    /// A raw log whose topic matches no marketplace event.
    pub fn unknown_log(block_number: u64, log_index: u64) -> Log {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0xee)], Default::default());
        raw_log(block_number, log_index, 0xee, data)
    }
}
