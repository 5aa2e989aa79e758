// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain and contract configuration types.

use alloy::primitives::{address, Address};
use url::Url;

/// Default chain: Base Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 84532;

/// ERC-4337 v0.6 EntryPoint.
pub const ENTRY_POINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// SimpleAccountFactory deployed alongside the v0.6 EntryPoint.
pub const SIMPLE_ACCOUNT_FACTORY_V06: Address = address!("9406Cc6185a346906296840746125a0E44976454");

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    pub rpc_url: Url,
    /// EIP-155 chain id
    pub chain_id: u64,
}

/// The fungible token the service moves by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub address: Address,
    pub symbol: String,
}

/// Transfer asset selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    /// The chain's native currency.
    Native,
    /// An ERC-20 contract.
    Token(Address),
}

impl TokenConfig {
    /// Resolve a client-supplied token selector.
    ///
    /// Missing selectors and the configured symbol (case-insensitive) map to
    /// the configured token; anything else is a native transfer.
    pub fn asset_for(&self, selector: Option<&str>) -> Asset {
        match selector.map(str::trim).filter(|s| !s.is_empty()) {
            None => Asset::Token(self.address),
            Some(s) if s.eq_ignore_ascii_case(&self.symbol) => Asset::Token(self.address),
            Some(_) => Asset::Native,
        }
    }
}

/// Bundler / paymaster endpoints and ERC-4337 contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAbstractionConfig {
    pub bundler_url: Url,
    pub paymaster_url: Url,
    pub entry_point: Address,
    pub factory: Address,
}
