// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Chain client adapter: the sole point of contact with the chain node.
//!
//! The adapter is transport only. It surfaces subscription drops and reorg
//! notices to the caller and never reconnects on its own; reconnection
//! policy belongs to the event synchronizer.

use std::future::Future;

use alloy::{
    network::Ethereum,
    primitives::{Address, Bytes, TxHash},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider, WsConnect,
    },
    rpc::types::{Filter, Log, TransactionRequest},
};
use tokio::sync::{broadcast, mpsc};

/// WebSocket provider type (with all fillers).
type WsProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Errors from chain node interactions.
#[derive(Debug, thiserror::Error)]
pub enum ChainClientError {
    #[error("invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("subscription error: {0}")]
    Subscription(String),
}

/// One notice on the live log stream.
#[derive(Debug, Clone)]
pub enum LogNotice {
    /// A new log from the watched contract.
    Log(Log),
    /// Transient stream error; the stream itself stays open.
    Error(String),
    /// A previously delivered log's block is no longer canonical.
    Reorg { block_number: u64 },
}

/// Handle to a live log subscription.
///
/// The stream is infinite until cancelled; `recv` returning `None` means the
/// underlying connection closed and the subscription is gone.
pub struct LogSubscription {
    rx: mpsc::Receiver<LogNotice>,
}

impl LogSubscription {
    /// Wrap a channel as a subscription. Used by fakes in tests.
    pub fn from_channel(rx: mpsc::Receiver<LogNotice>) -> Self {
        Self { rx }
    }

    /// Receive the next notice; `None` when the stream has closed.
    pub async fn recv(&mut self) -> Option<LogNotice> {
        self.rx.recv().await
    }
}

/// Capability interface over the chain node, fakeable in tests.
pub trait ChainClient: Send + Sync {
    /// Current chain head block number.
    fn block_number(&self) -> impl Future<Output = Result<u64, ChainClientError>> + Send;

    /// Read-only contract call (`eth_call`). No signature required.
    fn call(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<Bytes, ChainClientError>> + Send;

    /// Submit a caller-already-signed transaction (`eth_sendRawTransaction`).
    fn send_raw_transaction(
        &self,
        raw_tx: &[u8],
    ) -> impl Future<Output = Result<TxHash, ChainClientError>> + Send;

    /// One-shot historical log query scoped to the watched contract.
    fn filter_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<Log>, ChainClientError>> + Send;

    /// Open a live log subscription scoped to the watched contract.
    fn subscribe_logs(
        &self,
    ) -> impl Future<Output = Result<LogSubscription, ChainClientError>> + Send;
}

/// JSON-RPC/WebSocket chain client scoped to one contract address.
pub struct RpcChainClient {
    provider: WsProvider,
    contract_address: Address,
}

impl RpcChainClient {
    /// Connect to the chain node over WebSocket.
    ///
    /// Connection failure here is fatal to startup by design; once running,
    /// stream drops surface through the subscription instead.
    pub async fn connect(
        rpc_url: &url::Url,
        contract_address: Address,
    ) -> Result<Self, ChainClientError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(rpc_url.as_str()))
            .await
            .map_err(|e| ChainClientError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            provider,
            contract_address,
        })
    }

    /// The contract address this client watches.
    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    fn contract_filter(&self) -> Filter {
        Filter::new().address(self.contract_address)
    }
}

impl ChainClient for RpcChainClient {
    async fn block_number(&self) -> Result<u64, ChainClientError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainClientError::Rpc(e.to_string()))
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainClientError> {
        self.provider
            .call(request)
            .await
            .map_err(|e| ChainClientError::Rpc(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<TxHash, ChainClientError> {
        let pending = self
            .provider
            .send_raw_transaction(raw_tx)
            .await
            .map_err(|e| ChainClientError::Rpc(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn filter_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainClientError> {
        let filter = self
            .contract_filter()
            .from_block(from_block)
            .to_block(to_block);

        self.provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainClientError::Rpc(e.to_string()))
    }

    async fn subscribe_logs(&self) -> Result<LogSubscription, ChainClientError> {
        let filter = self.contract_filter();
        let mut subscription = self
            .provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| ChainClientError::Subscription(e.to_string()))?;

        // Forward node pushes into a bounded channel. Removed logs become
        // explicit reorg notices; lag is a transient error; channel close
        // means the stream ended.
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                let notice = match subscription.recv().await {
                    Ok(log) => match classify_log(log) {
                        Some(notice) => notice,
                        None => continue,
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        LogNotice::Error(format!("subscription lagged, missed {missed} logs"))
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(notice).await.is_err() {
                    // Subscriber dropped the handle; tear down.
                    break;
                }
            }
        });

        Ok(LogSubscription::from_channel(rx))
    }
}

/// Map a pushed log to a stream notice.
///
/// A removed log is a reorg notice for its block. A removed log with no
/// block number gives us nothing to rewind to, so it is dropped rather than
/// turned into a rewind-to-genesis.
fn classify_log(log: Log) -> Option<LogNotice> {
    if !log.removed {
        return Some(LogNotice::Log(log));
    }
    match log.block_number {
        Some(block_number) => Some(LogNotice::Reorg { block_number }),
        None => {
            tracing::warn!("Ignoring removed-log notice without a block number");
            None
        }
    }
}
