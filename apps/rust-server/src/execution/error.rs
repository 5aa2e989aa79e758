// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use alloy::primitives::B256;

use crate::blockchain::{ChainError, SmartAccountError};
use crate::custody::KeyError;
use crate::storage::StorageError;

/// Outcomes of a transfer that did not complete normally.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0}")]
    BadRequest(String),

    #[error("account abstraction is not configured")]
    NotConfigured,

    /// Broadcast, but not confirmed before the deadline. Re-query, do not resubmit.
    #[error("transaction {tx_hash} not confirmed in time")]
    TimedOut { tx_hash: B256 },

    /// Accepted by the bundler, but no transaction hash appeared.
    #[error("user operation {user_op_hash} submitted without a transaction hash")]
    SubmissionIncomplete { user_op_hash: B256 },

    #[error("{0}")]
    Failed(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ChainError> for ExecutionError {
    fn from(e: ChainError) -> Self {
        ExecutionError::Failed(e.to_string())
    }
}

impl From<SmartAccountError> for ExecutionError {
    fn from(e: SmartAccountError) -> Self {
        match e {
            SmartAccountError::NotConfigured => ExecutionError::NotConfigured,
            other => ExecutionError::Failed(other.to_string()),
        }
    }
}

impl From<KeyError> for ExecutionError {
    fn from(e: KeyError) -> Self {
        ExecutionError::Failed(format!("custodial key unusable: {e}"))
    }
}
