// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup. Missing or
//! unparseable required variables abort startup with a [`ConfigError`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CHAIN_RPC_URL` | WebSocket JSON-RPC endpoint of the chain node | Required |
//! | `CONTRACT_ADDRESS` | Marketplace contract address (0x-prefixed) | Required |
//! | `JWT_SECRET` | HMAC secret for session tokens | Required |
//! | `DATA_DIR` | Directory holding the mirror database | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `CHAIN_ID` | Numeric chain identifier | `1` |
//! | `GENESIS_BLOCK` | First block to backfill from | `0` |
//! | `SESSION_VALIDITY_HOURS` | Session token lifetime | `24` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;

use alloy::primitives::Address;
use url::Url;

/// Environment variable name for the mirror database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: Url,
    pub contract_address: Address,
    pub jwt_secret: String,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub chain_id: u64,
    pub genesis_block: u64,
    pub session_validity_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_url = require("CHAIN_RPC_URL")?;
        let rpc_url: Url = rpc_url.parse().map_err(|e| ConfigError::Invalid {
            var: "CHAIN_RPC_URL",
            reason: format!("{e}"),
        })?;

        let contract_address = require("CONTRACT_ADDRESS")?;
        let contract_address: Address =
            contract_address.parse().map_err(|e| ConfigError::Invalid {
                var: "CONTRACT_ADDRESS",
                reason: format!("{e}"),
            })?;

        let jwt_secret = require("JWT_SECRET")?;

        Ok(Self {
            rpc_url,
            contract_address,
            jwt_secret,
            data_dir: env::var(DATA_DIR_ENV)
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", 8080)?,
            chain_id: parse_or("CHAIN_ID", 1)?,
            genesis_block: parse_or("GENESIS_BLOCK", 0)?,
            session_validity_hours: parse_or("SESSION_VALIDITY_HOURS", 24)?,
        })
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}
