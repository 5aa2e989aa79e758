// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only wallet endpoints.

use axum::{extract::State, Json};
use chrono::Utc;

use crate::{
    auth::Account,
    error::{ApiError, ErrorBody},
    models::{
        AddressResponse, BalanceResponse, SmartAccountResponse, SpendLimitResponse, TransactionEntry,
        TransactionsResponse,
    },
    state::AppState,
};

/// Primary address of the signed-in account.
#[utoipa::path(
    get,
    path = "/v1/wallet/address",
    tag = "Wallet",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Primary address", body = AddressResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 409, description = "Account requires migration", body = ErrorBody)
    )
)]
pub async fn get_address(
    State(state): State<AppState>,
    Account(record): Account,
) -> Result<Json<AddressResponse>, ApiError> {
    let address = state.custody.primary_address(&record)?;
    Ok(Json(AddressResponse {
        address: address.to_checksum(None),
    }))
}

/// Counterfactual smart-account address, cached after the first lookup.
#[utoipa::path(
    get,
    path = "/v1/wallet/aa-address",
    tag = "Wallet",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Smart account address", body = SmartAccountResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 501, description = "Account abstraction not configured", body = ErrorBody)
    )
)]
pub async fn get_smart_account_address(
    State(state): State<AppState>,
    Account(record): Account,
) -> Result<Json<SmartAccountResponse>, ApiError> {
    if !state.engine.sponsorship_enabled() {
        return Err(ApiError::not_configured());
    }
    if let Some(cached) = record.smart_account_address.as_deref() {
        return Ok(Json(SmartAccountResponse {
            smart_account_address: cached.to_string(),
        }));
    }

    let owner = state.custody.primary_address(&record)?;
    let address = state.engine.smart_account_address(&record, owner).await?;
    Ok(Json(SmartAccountResponse {
        smart_account_address: address.to_checksum(None),
    }))
}

/// Native and configured-token balances of the primary address.
#[utoipa::path(
    get,
    path = "/v1/wallet/balance",
    tag = "Wallet",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Balances in base units", body = BalanceResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 500, description = "Chain query failed", body = ErrorBody)
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Account(record): Account,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address = state.custody.primary_address(&record)?;
    let balances = state.engine.balances(address).await?;

    Ok(Json(BalanceResponse {
        address: address.to_checksum(None),
        eth_wei: balances.native.to_string(),
        usdc_wei: balances.token.to_string(),
        token_symbol: state.engine.token().symbol.clone(),
    }))
}

/// Recent configured-token transfers of the primary address.
///
/// Covers roughly the last 9 500 blocks. Outbound transfers are listed
/// first, then inbound.
#[utoipa::path(
    get,
    path = "/v1/wallet/transactions",
    tag = "Wallet",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Transfer history", body = TransactionsResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 500, description = "Chain query failed", body = ErrorBody)
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Account(record): Account,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let address = state.custody.primary_address(&record)?;
    let symbol = state.engine.token().symbol.clone();

    let transactions = state
        .engine
        .history(address)
        .await?
        .into_iter()
        .map(|t| TransactionEntry {
            hash: t.tx_hash.to_string(),
            direction: t.direction.as_str().to_string(),
            amount: t.amount.to_string(),
            from: t.from.to_checksum(None),
            to: t.to.to_checksum(None),
            token: symbol.clone(),
            status: "confirmed".to_string(),
            block_number: t.block_number,
            log_index: t.log_index,
        })
        .collect();

    Ok(Json(TransactionsResponse { transactions }))
}

/// Today's sponsored spend against the configured cap.
#[utoipa::path(
    get,
    path = "/v1/wallet/limits",
    tag = "Wallet",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Spend for the current UTC day", body = SpendLimitResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    )
)]
pub async fn get_limits(
    State(state): State<AppState>,
    Account(record): Account,
) -> Json<SpendLimitResponse> {
    let today = Utc::now().date_naive();
    Json(SpendLimitResponse {
        date: today.format("%Y-%m-%d").to_string(),
        spent: state.spend.current_spend_on(&record.id, today).to_string(),
        limit: state.config.sponsored_daily_limit.map(|l| l.to_string()),
    })
}
