// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! ReVibe marketplace contract interface.
//!
//! The contract schema is fixed; this module defines it once with alloy's
//! `sol!` macro so event decoding and call encoding stay in sync with the
//! on-chain ABI.

use alloy::{
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
};

use super::client::{ChainClient, ChainClientError};

// Marketplace interface as deployed. Events carry the natural identity the
// mirror keys its upserts on (productId, or the buy transaction hash).
sol! {
    interface IReVibeMarket {
        event ProductListed(uint256 indexed productId, string name, uint256 price, address indexed seller);
        event ProductBought(uint256 indexed productId, address indexed buyer, uint256 price);
        event ProductAuthenticated(uint256 indexed productId, bool result);
        event PriceUpdated(uint256 indexed productId, uint256 newPrice);

        function listProduct(string name, uint256 price) external returns (uint256 productId);
        function buyProduct(uint256 productId) external payable;
        function authenticateProduct(uint256 productId, bool result) external;
        function updatePrice(uint256 productId, uint256 newPrice) external;
        function getProduct(uint256 productId) external view returns (string name, uint256 price, address seller, bool isListed, bool isAuthenticated);
    }
}

/// Documented gas fallbacks, used only when the caller supplies none.
pub const FALLBACK_GAS_PRICE_WEI: u128 = 20_000_000_000; // 20 gwei
pub const FALLBACK_GAS_LIMIT: u64 = 3_000_000;

/// Caller-supplied gas parameters for submitted transactions.
///
/// The adapter never estimates gas; it passes these through, falling back to
/// the documented constants when unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct GasParams {
    pub gas_price_wei: Option<u128>,
    pub gas_limit: Option<u64>,
}

impl GasParams {
    pub fn gas_price_or_fallback(&self) -> u128 {
        self.gas_price_wei.unwrap_or(FALLBACK_GAS_PRICE_WEI)
    }

    pub fn gas_limit_or_fallback(&self) -> u64 {
        self.gas_limit.unwrap_or(FALLBACK_GAS_LIMIT)
    }
}

/// On-chain product state as returned by `getProduct`.
#[derive(Debug, Clone)]
pub struct OnChainProduct {
    pub product_id: U256,
    pub name: String,
    pub price: U256,
    pub seller: Address,
    pub is_listed: bool,
    pub is_authenticated: bool,
}

/// Read-side wrapper over the marketplace contract.
///
/// Generic over the chain client capability so contract reads can be driven
/// by a fake in tests.
pub struct MarketContract<'a, C> {
    client: &'a C,
    address: Address,
}

impl<'a, C: ChainClient> MarketContract<'a, C> {
    pub fn new(client: &'a C, address: Address) -> Self {
        Self { client, address }
    }

    /// Fetch the on-chain state for a product via `eth_call`.
    pub async fn get_product(&self, product_id: U256) -> Result<OnChainProduct, ChainClientError> {
        let call = IReVibeMarket::getProductCall { productId: product_id };
        let request = TransactionRequest::default()
            .to(self.address)
            .input(Bytes::from(call.abi_encode()).into());

        let raw = self.client.call(request).await?;
        let decoded = IReVibeMarket::getProductCall::abi_decode_returns(&raw)
            .map_err(|e| ChainClientError::Rpc(format!("getProduct decode failed: {e}")))?;

        Ok(OnChainProduct {
            product_id,
            name: decoded.name,
            price: decoded.price,
            seller: decoded.seller,
            is_listed: decoded.isListed,
            is_authenticated: decoded.isAuthenticated,
        })
    }

    /// Build the unsigned transaction for a state-changing contract call.
    ///
    /// The caller signs the result out of band and submits it through
    /// [`ChainClient::send_raw_transaction`]. Gas is pass-through: the
    /// caller's parameters are used as given, with the documented fallbacks
    /// filling whatever was left unset.
    pub fn transaction_request(&self, calldata: Vec<u8>, gas: GasParams) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .to(self.address)
            .gas_limit(gas.gas_limit_or_fallback())
            .input(Bytes::from(calldata).into());
        request.gas_price = Some(gas.gas_price_or_fallback());
        request
    }
}

/// Encode the calldata for `listProduct(name, price)`.
pub fn encode_list_product(name: &str, price: U256) -> Vec<u8> {
    IReVibeMarket::listProductCall {
        name: name.to_string(),
        price,
    }
    .abi_encode()
}

/// Encode the calldata for `buyProduct(productId)`.
pub fn encode_buy_product(product_id: U256) -> Vec<u8> {
    IReVibeMarket::buyProductCall { productId: product_id }.abi_encode()
}

/// Encode the calldata for `authenticateProduct(productId, result)`.
pub fn encode_authenticate_product(product_id: U256, result: bool) -> Vec<u8> {
    IReVibeMarket::authenticateProductCall {
        productId: product_id,
        result,
    }
    .abi_encode()
}

/// Encode the calldata for `updatePrice(productId, newPrice)`.
pub fn encode_update_price(product_id: U256, new_price: U256) -> Vec<u8> {
    IReVibeMarket::updatePriceCall {
        productId: product_id,
        newPrice: new_price,
    }
    .abi_encode()
}

/// ABI-encode a `getProduct` return tuple. Used by tests that fake `eth_call`.
#[cfg(test)]
pub fn encode_get_product_return(
    name: &str,
    price: U256,
    seller: Address,
    is_listed: bool,
    is_authenticated: bool,
) -> Vec<u8> {
    use alloy::sol_types::SolValue;
    (name.to_string(), price, seller, is_listed, is_authenticated).abi_encode_sequence()
}
