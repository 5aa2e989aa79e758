// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded-lookback token transfer history.
//!
//! ## Strategy
//!
//! Two `eth_getLogs` scans for ERC-20 `Transfer` on the configured token over
//! the last [`HISTORY_LOOKBACK_BLOCKS`] blocks: one with the account as
//! sender (topic 1), one as recipient (topic 2). Results keep discovery
//! order, outbound first. Block number and log index are carried so callers
//! can sort. Older history is not visible.

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::{Filter, Log},
    providers::Provider,
    sol_types::SolEvent,
};

use super::client::{ChainClient, ChainError};
use super::erc20::IERC20;

/// How far back the history scan reaches.
pub const HISTORY_LOOKBACK_BLOCKS: u64 = 9_500;

/// Direction of a transfer relative to the queried account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Receive => "receive",
        }
    }
}

/// One decoded token transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub tx_hash: B256,
    pub direction: Direction,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

/// Fetch transfers of `token` touching `account` in the lookback window.
pub async fn token_transfers(
    client: &ChainClient,
    token: Address,
    account: Address,
) -> Result<Vec<TransferRecord>, ChainError> {
    let head = client.block_number().await?;
    let from_block = head.saturating_sub(HISTORY_LOOKBACK_BLOCKS);
    let account_topic = account.into_word();

    let base = Filter::new()
        .address(token)
        .event_signature(IERC20::Transfer::SIGNATURE_HASH)
        .from_block(from_block)
        .to_block(head);

    let outbound = client
        .provider()
        .get_logs(&base.clone().topic1(account_topic))
        .await
        .map_err(|e| ChainError::Rpc(e.to_string()))?;
    let inbound = client
        .provider()
        .get_logs(&base.topic2(account_topic))
        .await
        .map_err(|e| ChainError::Rpc(e.to_string()))?;

    let records: Vec<TransferRecord> = outbound
        .iter()
        .chain(inbound.iter())
        .filter_map(|log| decode_transfer(log, account))
        .collect();

    tracing::debug!(
        account = %account,
        from_block,
        to_block = head,
        count = records.len(),
        "fetched transfer history"
    );
    Ok(records)
}

/// Decode a `Transfer` log, classifying it against `account`.
///
/// Logs without a transaction hash or with unexpected topics are skipped.
pub fn decode_transfer(log: &Log, account: Address) -> Option<TransferRecord> {
    // Transfer event has 3 topics: [event_sig, from, to] and data = value
    let topics = log.topics();
    if topics.len() < 3 || topics[0] != IERC20::Transfer::SIGNATURE_HASH {
        return None;
    }
    let tx_hash = log.transaction_hash?;

    // Addresses are the last 20 bytes of each 32-byte topic
    let from = Address::from_slice(&topics[1][12..]);
    let to = Address::from_slice(&topics[2][12..]);

    let data = &log.data().data;
    let amount = if data.len() >= 32 {
        U256::from_be_slice(&data[..32])
    } else {
        U256::ZERO
    };

    let direction = if to == account {
        Direction::Receive
    } else {
        Direction::Send
    };

    Some(TransferRecord {
        tx_hash,
        direction,
        from,
        to,
        amount,
        block_number: log.block_number,
        log_index: log.log_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256, Bytes, LogData};

    const TOKEN: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");
    const ME: Address = address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    const OTHER: Address = address!("2B5AD5c4795c026514f8317c7a215E218DcCD6cF");
    const HASH: B256 = b256!("1111111111111111111111111111111111111111111111111111111111111111");

    fn transfer_log(from: Address, to: Address, value: u64, tx_hash: Option<B256>) -> Log {
        let topics = vec![
            IERC20::Transfer::SIGNATURE_HASH,
            from.into_word(),
            to.into_word(),
        ];
        let data = Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec());
        Log {
            inner: alloy::primitives::Log {
                address: TOKEN,
                data: LogData::new_unchecked(topics, data),
            },
            transaction_hash: tx_hash,
            block_number: Some(42),
            log_index: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn classifies_inbound_and_outbound() {
        let sent = decode_transfer(&transfer_log(ME, OTHER, 7, Some(HASH)), ME).unwrap();
        assert_eq!(sent.direction, Direction::Send);
        assert_eq!(sent.from, ME);
        assert_eq!(sent.to, OTHER);
        assert_eq!(sent.amount, U256::from(7));
        assert_eq!(sent.block_number, Some(42));
        assert_eq!(sent.log_index, Some(3));

        let received = decode_transfer(&transfer_log(OTHER, ME, 9, Some(HASH)), ME).unwrap();
        assert_eq!(received.direction, Direction::Receive);
        assert_eq!(received.direction.as_str(), "receive");
    }

    #[test]
    fn self_transfer_counts_as_receive() {
        let record = decode_transfer(&transfer_log(ME, ME, 1, Some(HASH)), ME).unwrap();
        assert_eq!(record.direction, Direction::Receive);
    }

    #[test]
    fn skips_logs_without_hash_or_topics() {
        assert!(decode_transfer(&transfer_log(ME, OTHER, 1, None), ME).is_none());

        let mut log = transfer_log(ME, OTHER, 1, Some(HASH));
        log.inner.data = LogData::new_unchecked(vec![IERC20::Transfer::SIGNATURE_HASH], Bytes::new());
        assert!(decode_transfer(&log, ME).is_none());
    }
}
