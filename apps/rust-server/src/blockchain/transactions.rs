// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Direct transfer building, broadcasting and confirmation.
//!
//! Nonce, gas and chain id are filled by the signing provider. After
//! broadcast the hash is captured before waiting, so a confirmation timeout
//! can still report which transaction is in flight.

use std::time::Duration;

use alloy::{
    primitives::{Address, B256, U256},
    providers::{DynProvider, Provider},
    rpc::types::TransactionRequest,
};

use super::client::ChainError;
use super::erc20::transfer_calldata;
use super::types::Asset;

/// Confirmations required before a direct transfer counts as done.
pub const REQUIRED_CONFIRMATIONS: u64 = 1;

/// Ceiling on the confirmation wait.
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a broadcast transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectOutcome {
    /// Mined and successful.
    Confirmed { tx_hash: B256, block_number: Option<u64> },
    /// Accepted by the node but not confirmed before the deadline.
    TimedOut { tx_hash: B256 },
}

/// Build an unsigned transfer of `amount` base units of `asset` to `to`.
pub fn build_transfer(asset: Asset, to: Address, amount: U256) -> TransactionRequest {
    match asset {
        Asset::Native => TransactionRequest::default().to(to).value(amount),
        Asset::Token(token) => TransactionRequest::default()
            .to(token)
            .input(transfer_calldata(to, amount).into()),
    }
}

/// Sign, broadcast and wait for confirmation.
pub async fn send_and_confirm(
    provider: &DynProvider,
    tx: TransactionRequest,
    timeout: Duration,
) -> Result<DirectOutcome, ChainError> {
    let pending = provider
        .send_transaction(tx)
        .await
        .map_err(|e| ChainError::TransactionFailed(format!("Failed to send: {e}")))?;
    let tx_hash = *pending.tx_hash();
    tracing::info!(tx_hash = %tx_hash, "transaction submitted");

    let wait = pending
        .with_required_confirmations(REQUIRED_CONFIRMATIONS)
        .get_receipt();

    match tokio::time::timeout(timeout, wait).await {
        Err(_) => {
            tracing::warn!(tx_hash = %tx_hash, "transaction not confirmed in time");
            Ok(DirectOutcome::TimedOut { tx_hash })
        }
        Ok(Err(e)) => Err(ChainError::TransactionFailed(format!(
            "Failed waiting for {tx_hash}: {e}"
        ))),
        Ok(Ok(receipt)) if !receipt.status() => Err(ChainError::TransactionFailed(format!(
            "Transaction {tx_hash} reverted"
        ))),
        Ok(Ok(receipt)) => {
            tracing::info!(tx_hash = %tx_hash, block = ?receipt.block_number, "transaction confirmed");
            Ok(DirectOutcome::Confirmed {
                tx_hash,
                block_number: receipt.block_number,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const TO: Address = address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    const TOKEN: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

    #[test]
    fn native_transfer_carries_value() {
        let tx = build_transfer(Asset::Native, TO, U256::from(5));
        assert_eq!(tx.to, Some(TO.into()));
        assert_eq!(tx.value, Some(U256::from(5)));
        assert!(tx.input.input().is_none());
    }

    #[test]
    fn token_transfer_targets_contract() {
        let tx = build_transfer(Asset::Token(TOKEN), TO, U256::from(5));
        assert_eq!(tx.to, Some(TOKEN.into()));
        assert!(tx.value.is_none());
        let input = tx.input.input().unwrap();
        assert_eq!(input.as_ref(), transfer_calldata(TO, U256::from(5)).as_ref());
    }
}
