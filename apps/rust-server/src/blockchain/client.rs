// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM JSON-RPC client for reads and for building signing providers.

use alloy::{
    network::EthereumWallet,
    primitives::{Address, Bytes, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};

use super::erc20::Erc20Contract;
use super::types::NetworkConfig;

/// Chain client shared across requests.
#[derive(Clone)]
pub struct ChainClient {
    /// Network configuration
    network: NetworkConfig,
    /// Read-only alloy HTTP provider
    provider: DynProvider,
}

impl ChainClient {
    /// Create a client for the configured network. No network I/O happens here.
    pub fn new(network: NetworkConfig) -> Self {
        let provider = ProviderBuilder::new()
            .connect_http(network.rpc_url.clone())
            .erased();
        Self { network, provider }
    }

    /// Read-only provider.
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Provider that signs and fills (nonce, gas, chain id) with `signer`.
    pub fn signing_provider(&self, signer: PrivateKeySigner) -> DynProvider {
        ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.network.rpc_url.clone())
            .erased()
    }

    /// Native balance in wei.
    pub async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    /// ERC-20 balance in base units.
    pub async fn token_balance(&self, token: Address, account: Address) -> Result<U256, ChainError> {
        Erc20Contract::new(&self.provider, token).balance_of(account).await
    }

    /// Get the current block number.
    pub async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    /// Deployed bytecode at `account` (empty for EOAs and undeployed accounts).
    pub async fn code_at(&self, account: Address) -> Result<Bytes, ChainError> {
        self.provider
            .get_code_at(account)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    /// `(max_fee_per_gas, max_priority_fee_per_gas)` from the node's estimator.
    pub async fn eip1559_fees(&self) -> Result<(u128, u128), ChainError> {
        let estimate = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok((estimate.max_fee_per_gas, estimate.max_priority_fee_per_gas))
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_is_offline() {
        let network = NetworkConfig {
            rpc_url: "http://127.0.0.1:1".parse().unwrap(),
            chain_id: 84532,
        };
        let client = ChainClient::new(network.clone());
        assert_eq!(client.network(), &network);
    }
}
