// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use alloy::primitives::B256;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::custody::CustodyError;
use crate::execution::ExecutionError;
use crate::storage::StorageError;

pub const NOT_CONFIGURED_MESSAGE: &str =
    "AA not configured. Set BICONOMY_BUNDLER_URL and BICONOMY_PAYMASTER_URL.";
pub const GONE_MESSAGE: &str = "Deprecated: sponsorship removed. Use AA endpoint /v1/wallet/send-aa.";
pub const MIGRATION_REQUIRED: &str = "account_requires_migration";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub tx_hash: Option<B256>,
    pub user_op_hash: Option<B256>,
    pub wallet_address: Option<String>,
}

/// JSON error body.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
    /// Stable machine-readable code
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_op_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            tx_hash: None,
            user_op_hash: None,
            wallet_address: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn invalid_credentials() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_credentials", "Invalid credentials")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn migration_required(wallet_address: Option<String>) -> Self {
        Self {
            wallet_address,
            ..Self::new(StatusCode::CONFLICT, MIGRATION_REQUIRED, MIGRATION_REQUIRED)
        }
    }

    pub fn not_configured() -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, "not_configured", NOT_CONFIGURED_MESSAGE)
    }

    pub fn timed_out(tx_hash: B256) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            ..Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "timed_out",
                "Transaction submitted but not confirmed in time",
            )
        }
    }

    pub fn submission_incomplete(user_op_hash: B256) -> Self {
        Self {
            user_op_hash: Some(user_op_hash),
            ..Self::new(
                StatusCode::BAD_GATEWAY,
                "submission_incomplete",
                "Failed to obtain transaction hash from AA send",
            )
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "failed", reason)
    }

    pub fn gone() -> Self {
        Self::new(StatusCode::GONE, "gone", GONE_MESSAGE)
    }

    pub fn limit_exceeded() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "limit_exceeded",
            "Daily sponsored limit exceeded",
        )
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "Too many requests")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl From<CustodyError> for ApiError {
    fn from(e: CustodyError) -> Self {
        match e {
            CustodyError::BadRequest(msg) => ApiError::bad_request(msg),
            CustodyError::Conflict => ApiError::conflict("User already exists"),
            CustodyError::InvalidCredentials => ApiError::invalid_credentials(),
            CustodyError::MigrationRequired { address } => ApiError::migration_required(address),
            CustodyError::Unauthorized => ApiError::unauthorized("Unauthorized"),
            CustodyError::DecryptionFailed => {
                tracing::warn!("custodial key decryption failed during request");
                ApiError::unauthorized("Unauthorized")
            }
            CustodyError::Storage(e) => e.into(),
            CustodyError::Internal(msg) => {
                tracing::error!(error = %msg, "custody failure");
                ApiError::internal("Internal error")
            }
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::BadRequest(msg) => ApiError::bad_request(msg),
            ExecutionError::NotConfigured => ApiError::not_configured(),
            ExecutionError::TimedOut { tx_hash } => ApiError::timed_out(tx_hash),
            ExecutionError::SubmissionIncomplete { user_op_hash } => {
                ApiError::submission_incomplete(user_op_hash)
            }
            ExecutionError::Failed(reason) => {
                tracing::warn!(reason = %reason, "transfer failed");
                ApiError::failed(reason)
            }
            ExecutionError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        tracing::error!(error = %e, "storage failure");
        ApiError::internal("Internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code.to_string(),
            tx_hash: self.tx_hash.map(|h| h.to_string()),
            user_op_hash: self.user_op_hash.map(|h| h.to_string()),
            wallet_address: self.wallet_address,
        });
        (self.status, body).into_response()
    }
}
