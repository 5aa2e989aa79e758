// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain integration.
//!
//! This module provides functionality for:
//! - Querying native and ERC-20 balances
//! - Building, signing and confirming direct transfers
//! - Scanning recent token transfer history
//! - Submitting paymaster-sponsored ERC-4337 user operations

pub mod bundler;
pub mod client;
pub mod erc20;
pub mod history;
pub mod smart_account;
pub mod transactions;
pub mod types;
pub mod user_operation;

pub use client::{ChainClient, ChainError};
pub use history::{Direction, TransferRecord};
pub use smart_account::{BundlerSmartAccountClient, SmartAccountCall, SmartAccountClient, SmartAccountError};
pub use transactions::DirectOutcome;
pub use types::*;
