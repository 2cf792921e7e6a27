// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Embedded mirror store backed by redb (pure Rust, ACID).
//!
//! Holds the local projection of on-chain marketplace state plus the sync
//! cursor and user identities.
//!
//! ## Table Layout
//!
//! - `products`: product_id (decimal string) → serialized ProductRecord
//! - `orders`: tx_hash → serialized OrderRecord
//! - `authentications`: product_id → serialized AuthenticationRecord
//! - `users`: user_id → serialized User
//! - `wallet_index`: lowercase wallet address → user_id
//! - `sync_state`: singleton cursor key → 16 bytes (block BE || log index BE)
//!
//! All event-driven writes are idempotent upserts keyed by the event's
//! natural identity, so redelivery during backfill-after-reconnect is a
//! no-op rather than a duplicate side effect.

use std::path::Path;

use alloy::primitives::Address;
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::chain::{ChainEvent, DecodedEvent};
use crate::models::{AuthenticationRecord, OrderRecord, ProductRecord, User};
use crate::sync::{ApplyError, EventConsumer, SyncCursor};

// =============================================================================
// Table Definitions
// =============================================================================

const PRODUCTS: TableDefinition<&str, &[u8]> = TableDefinition::new("products");
const ORDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
const AUTHENTICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("authentications");
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const WALLET_INDEX: TableDefinition<&str, &str> = TableDefinition::new("wallet_index");
const SYNC_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_state");

/// Fixed singleton key for the sync cursor.
const CURSOR_KEY: &str = "cursor";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("event references unknown product {0}")]
    UnknownProduct(String),
}

pub type MirrorResult<T> = Result<T, MirrorError>;

// =============================================================================
// Cursor Encoding
// =============================================================================

fn encode_cursor(cursor: SyncCursor) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&cursor.block_number.to_be_bytes());
    bytes[8..].copy_from_slice(&cursor.log_index.to_be_bytes());
    bytes
}

fn decode_cursor(bytes: &[u8]) -> Option<SyncCursor> {
    if bytes.len() != 16 {
        return None;
    }
    Some(SyncCursor {
        block_number: u64::from_be_bytes(bytes[..8].try_into().ok()?),
        log_index: u64::from_be_bytes(bytes[8..].try_into().ok()?),
    })
}

// =============================================================================
// MirrorStore
// =============================================================================

/// Embedded ACID mirror of on-chain marketplace state.
pub struct MirrorStore {
    db: Database,
}

impl MirrorStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> MirrorResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRODUCTS)?;
            let _ = write_txn.open_table(ORDERS)?;
            let _ = write_txn.open_table(AUTHENTICATIONS)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(WALLET_INDEX)?;
            let _ = write_txn.open_table(SYNC_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Event Application
    // =========================================================================

    /// Apply one decoded chain event to the mirror.
    ///
    /// Dispatch is exhaustive over the event kind. Each upsert is keyed by
    /// the event's natural identity; re-applying the same event leaves the
    /// mirror unchanged. Events that assume earlier state (a price update or
    /// sale for a product that was never listed) fail with
    /// [`MirrorError::UnknownProduct`] instead of writing partial rows.
    pub fn apply_event(&self, event: &DecodedEvent) -> MirrorResult<()> {
        let block_number = event.id.block_number;
        let tx_hash = format!("{:#x}", event.tx_hash);

        match &event.event {
            ChainEvent::ProductListed {
                product_id,
                name,
                price,
                seller,
            } => self.upsert_product(ProductRecord {
                product_id: product_id.to_string(),
                name: name.clone(),
                price: price.to_string(),
                seller: seller.to_checksum(None),
                is_listed: true,
                is_authenticated: false,
                last_event_block: block_number,
                updated_at: Utc::now(),
            }),
            ChainEvent::PriceUpdated {
                product_id,
                new_price,
            } => self.update_product(&product_id.to_string(), block_number, |product| {
                product.price = new_price.to_string();
            }),
            ChainEvent::ProductBought {
                product_id,
                buyer,
                price,
            } => {
                let product_key = product_id.to_string();
                // Always re-apply the unlisting: a redelivered ProductListed
                // may have reset the row since the first application.
                self.update_product(&product_key, block_number, |product| {
                    product.is_listed = false;
                })?;
                // The sale itself is keyed by tx hash; a redelivered event
                // finds the existing order and inserts nothing.
                if self.get_order(&tx_hash)?.is_some() {
                    return Ok(());
                }
                self.insert_order(OrderRecord {
                    tx_hash,
                    product_id: product_key,
                    buyer: buyer.to_checksum(None),
                    price: price.to_string(),
                    block_number,
                    completed_at: Utc::now(),
                })
            }
            ChainEvent::ProductAuthenticated { product_id, result } => {
                let product_key = product_id.to_string();
                self.update_product(&product_key, block_number, |product| {
                    product.is_authenticated = true;
                })?;
                self.upsert_authentication(AuthenticationRecord {
                    product_id: product_key,
                    result: *result,
                    tx_hash,
                    block_number,
                    recorded_at: Utc::now(),
                })
            }
        }
    }

    /// Drop mirror rows derived from blocks at or after `block_number`.
    ///
    /// Used on chain reorganization: orders and authenticity determinations
    /// from the divergent range are removed; product rows are left for the
    /// canonical replay to overwrite.
    pub fn rewind(&self, block_number: u64) -> MirrorResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut orders = write_txn.open_table(ORDERS)?;
            retain_below_block(&mut orders, block_number, |order: &OrderRecord| {
                order.block_number
            })?;

            let mut auths = write_txn.open_table(AUTHENTICATIONS)?;
            retain_below_block(&mut auths, block_number, |auth: &AuthenticationRecord| {
                auth.block_number
            })?;

            let mut state = write_txn.open_table(SYNC_STATE)?;
            if block_number == 0 {
                state.remove(CURSOR_KEY)?;
            } else {
                // Treat everything through the end of the prior block as
                // durably processed; replay re-validates from there.
                let cursor = SyncCursor {
                    block_number: block_number - 1,
                    log_index: u64::MAX,
                };
                state.insert(CURSOR_KEY, encode_cursor(cursor).as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Sync Cursor
    // =========================================================================

    /// Last durably processed (block, log index) pair, if any.
    pub fn sync_cursor(&self) -> MirrorResult<Option<SyncCursor>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_STATE)?;
        match table.get(CURSOR_KEY)? {
            Some(value) => Ok(decode_cursor(value.value())),
            None => Ok(None),
        }
    }

    /// Persist the cursor. The synchronizer is the only writer.
    pub fn set_sync_cursor(&self, cursor: SyncCursor) -> MirrorResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SYNC_STATE)?;
            table.insert(CURSOR_KEY, encode_cursor(cursor).as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Products / Orders / Authentications
    // =========================================================================

    fn upsert_product(&self, product: ProductRecord) -> MirrorResult<()> {
        let json = serde_json::to_vec(&product)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PRODUCTS)?;
            table.insert(product.product_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Read-modify-write a product row; fails if the product was never listed.
    fn update_product(
        &self,
        product_id: &str,
        block_number: u64,
        mutate: impl FnOnce(&mut ProductRecord),
    ) -> MirrorResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PRODUCTS)?;
            let mut product: ProductRecord = match table.get(product_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(MirrorError::UnknownProduct(product_id.to_string())),
            };
            mutate(&mut product);
            product.last_event_block = block_number;
            product.updated_at = Utc::now();
            let json = serde_json::to_vec(&product)?;
            table.insert(product_id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a mirrored product.
    pub fn get_product(&self, product_id: &str) -> MirrorResult<Option<ProductRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;
        match table.get(product_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn insert_order(&self, order: OrderRecord) -> MirrorResult<()> {
        let json = serde_json::to_vec(&order)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ORDERS)?;
            table.insert(order.tx_hash.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a mirrored sale by transaction hash.
    pub fn get_order(&self, tx_hash: &str) -> MirrorResult<Option<OrderRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS)?;
        match table.get(tx_hash)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn upsert_authentication(&self, auth: AuthenticationRecord) -> MirrorResult<()> {
        let json = serde_json::to_vec(&auth)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTHENTICATIONS)?;
            table.insert(auth.product_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up the authenticity determination for a product.
    pub fn get_authentication(&self, product_id: &str) -> MirrorResult<Option<AuthenticationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUTHENTICATIONS)?;
        match table.get(product_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Find the user bound to `address`, creating one on first login.
    ///
    /// Returns the user and whether it was just created. Creation is the
    /// only login-path write to the store.
    pub fn find_or_create_user(&self, address: Address) -> MirrorResult<(User, bool)> {
        let wallet_key = format!("{address:#x}"); // lowercase hex

        if let Some(existing) = self.get_user_by_wallet(&wallet_key)? {
            return Ok((existing, false));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            wallet_address: address.to_checksum(None),
            name: None,
            avatar: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_vec(&user)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut index = write_txn.open_table(WALLET_INDEX)?;
            // Re-check under the write transaction in case of a concurrent
            // first login for the same wallet. Deserialize into a local so no
            // table access guard outlives this lookup.
            let existing_id = index
                .get(wallet_key.as_str())?
                .map(|v| v.value().to_string());
            if let Some(existing_id) = existing_id {
                let existing: Option<User> = users
                    .get(existing_id.as_str())?
                    .map(|v| serde_json::from_slice(v.value()))
                    .transpose()?;
                if let Some(existing) = existing {
                    drop(users);
                    drop(index);
                    write_txn.commit()?;
                    return Ok((existing, false));
                }
            }
            users.insert(user.id.as_str(), json.as_slice())?;
            index.insert(wallet_key.as_str(), user.id.as_str())?;
        }
        write_txn.commit()?;
        Ok((user, true))
    }

    /// Look up a user by local identifier.
    pub fn get_user(&self, user_id: &str) -> MirrorResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn get_user_by_wallet(&self, wallet_key: &str) -> MirrorResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(WALLET_INDEX)?;
        let user_id = match index.get(wallet_key)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        drop(index);
        self.get_user(&user_id)
    }
}

/// Delete all rows whose block number is at or after `block_number`.
fn retain_below_block<R: serde::de::DeserializeOwned>(
    table: &mut redb::Table<'_, &str, &[u8]>,
    block_number: u64,
    block_of: impl Fn(&R) -> u64,
) -> MirrorResult<()> {
    let mut stale_keys = Vec::new();
    for entry in table.iter()? {
        let entry = entry?;
        let row: R = serde_json::from_slice(entry.1.value())?;
        if block_of(&row) >= block_number {
            stale_keys.push(entry.0.value().to_string());
        }
    }
    for key in stale_keys {
        table.remove(key.as_str())?;
    }
    Ok(())
}

// The mirror is the synchronizer's consumer: idempotent upserts plus the
// cursor it owns.
impl EventConsumer for MirrorStore {
    fn apply(&self, event: &DecodedEvent) -> Result<(), ApplyError> {
        self.apply_event(event).map_err(|e| match e {
            MirrorError::UnknownProduct(id) => ApplyError::OutOfOrder(id),
            other => ApplyError::Storage(other.to_string()),
        })
    }

    fn cursor(&self) -> Result<Option<SyncCursor>, ApplyError> {
        self.sync_cursor()
            .map_err(|e| ApplyError::Storage(e.to_string()))
    }

    fn set_cursor(&self, cursor: SyncCursor) -> Result<(), ApplyError> {
        self.set_sync_cursor(cursor)
            .map_err(|e| ApplyError::Storage(e.to_string()))
    }

    fn rewind(&self, block_number: u64) -> Result<(), ApplyError> {
        self.rewind(block_number)
            .map_err(|e| ApplyError::Storage(e.to_string()))
    }
}
