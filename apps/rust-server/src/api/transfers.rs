// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Value-moving endpoints.
//!
//! - `POST /v1/wallet/send`: directly signed transfer, waits for one confirmation
//! - `POST /v1/wallet/send-aa`: paymaster-sponsored ERC-4337 transfer
//! - `POST /v1/wallet/sponsor`, `POST /v1/wallet/send-sponsored`: retired, always 410

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::Account,
    error::{ApiError, ErrorBody},
    execution::{
        parse_amount, parse_recipient, DirectTransfer, ExecutionError, SponsoredTransfer,
        TransferKind,
    },
    models::{SendRequest, SponsoredSendRequest, TxHashResponse},
    state::AppState,
};

/// Send from the primary address, signed with the custodial key.
///
/// On a confirmation timeout the response is 504 and still carries
/// `txHash`; query it rather than resubmitting.
#[utoipa::path(
    post,
    path = "/v1/wallet/send",
    tag = "Transfers",
    security(("bearer" = [])),
    request_body = SendRequest,
    responses(
        (status = 201, description = "Transfer confirmed", body = TxHashResponse),
        (status = 400, description = "Invalid recipient or amount", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 409, description = "Account requires migration", body = ErrorBody),
        (status = 500, description = "Transfer failed", body = ErrorBody),
        (status = 504, description = "Not confirmed in time", body = ErrorBody)
    )
)]
pub async fn send(
    State(state): State<AppState>,
    Account(record): Account,
    Json(body): Json<SendRequest>,
) -> Result<(StatusCode, Json<TxHashResponse>), ApiError> {
    let transfer = DirectTransfer {
        to: parse_recipient(&body.to)?,
        amount: parse_amount(&body.amount)?,
        asset: state.engine.token().asset_for(body.token.as_deref()),
    };

    let key = state.custody.signing_key(&record)?;
    let receipt = state
        .engine
        .execute(&record, &key, TransferKind::Direct(transfer))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TxHashResponse {
            tx_hash: receipt.tx_hash.to_string(),
        }),
    ))
}

/// Send the configured token from the account's smart account, gas paid by
/// the paymaster.
///
/// Subject to `SPONSORED_DAILY_LIMIT` when configured. The amount counts
/// toward the limit once the operation reached the bundler, including when
/// no transaction hash came back.
#[utoipa::path(
    post,
    path = "/v1/wallet/send-aa",
    tag = "Transfers",
    security(("bearer" = [])),
    request_body = SponsoredSendRequest,
    responses(
        (status = 201, description = "Included on chain", body = TxHashResponse),
        (status = 400, description = "Invalid recipient or amount", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 429, description = "Daily sponsored limit exceeded", body = ErrorBody),
        (status = 500, description = "Transfer failed", body = ErrorBody),
        (status = 501, description = "Account abstraction not configured", body = ErrorBody),
        (status = 502, description = "Submitted but no transaction hash obtained", body = ErrorBody)
    )
)]
pub async fn send_aa(
    State(state): State<AppState>,
    Account(record): Account,
    Json(body): Json<SponsoredSendRequest>,
) -> Result<(StatusCode, Json<TxHashResponse>), ApiError> {
    if !state.engine.sponsorship_enabled() {
        return Err(ApiError::not_configured());
    }

    let transfer = SponsoredTransfer {
        to: parse_recipient(&body.to)?,
        amount: parse_amount(&body.amount)?,
    };

    if let Some(limit) = state.config.sponsored_daily_limit {
        if state.spend.would_exceed(&record.id, transfer.amount, limit) {
            tracing::info!(account = %record.id, amount = %transfer.amount, "sponsored daily limit reached");
            return Err(ApiError::limit_exceeded());
        }
    }

    let amount = transfer.amount;
    let key = state.custody.signing_key(&record)?;
    let outcome = state
        .engine
        .execute(&record, &key, TransferKind::Sponsored(transfer))
        .await;

    if matches!(outcome, Ok(_) | Err(ExecutionError::SubmissionIncomplete { .. })) {
        let total = state.spend.record_spend(&record.id, amount);
        tracing::debug!(account = %record.id, spent_today = %total, "sponsored spend recorded");
    }
    let receipt = outcome?;

    Ok((
        StatusCode::CREATED,
        Json(TxHashResponse {
            tx_hash: receipt.tx_hash.to_string(),
        }),
    ))
}

/// Retired in-house sponsorship. Use `/v1/wallet/send-aa`.
#[utoipa::path(
    post,
    path = "/v1/wallet/sponsor",
    tag = "Transfers",
    responses((status = 410, description = "Retired", body = ErrorBody))
)]
pub async fn sponsor() -> ApiError {
    ApiError::gone()
}

/// Retired in-house sponsored send. Use `/v1/wallet/send-aa`.
#[utoipa::path(
    post,
    path = "/v1/wallet/send-sponsored",
    tag = "Transfers",
    responses((status = 410, description = "Retired", body = ErrorBody))
)]
pub async fn send_sponsored() -> ApiError {
    ApiError::gone()
}
