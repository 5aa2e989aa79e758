// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. All types derive
//! `ToSchema` for the OpenAPI document; field names are camelCase on the
//! wire.
//!
//! ## Amounts
//!
//! Amounts are integer base units of the asset (no decimal scaling) and are
//! always rendered as decimal strings. Requests accept either a string or a
//! JSON number.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Auth Models
// =============================================================================

/// Sign-up and sign-in body.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Issued session.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// HS256 session token, valid for 12 hours
    pub access_token: String,
    /// Primary (externally owned) address
    pub wallet_address: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub email: String,
    pub wallet_address: Option<String>,
}

// =============================================================================
// Wallet Models
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddressResponse {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SmartAccountResponse {
    pub smart_account_address: String,
}

/// Point-in-time balances in base units.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub address: String,
    /// Native balance in wei
    pub eth_wei: String,
    /// Configured token balance in base units
    pub usdc_wei: String,
    pub token_symbol: String,
}

/// One configured-token transfer touching the account.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub hash: String,
    /// `send` or `receive`, relative to the account
    #[serde(rename = "type")]
    pub direction: String,
    pub amount: String,
    pub from: String,
    pub to: String,
    pub token: String,
    pub status: String,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionEntry>,
}

/// Today's sponsored spend.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SpendLimitResponse {
    /// UTC date (`YYYY-MM-DD`)
    pub date: String,
    pub spent: String,
    /// Daily cap, absent when unlimited
    pub limit: Option<String>,
}

// =============================================================================
// Transfer Models
// =============================================================================

/// Direct transfer body.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct SendRequest {
    /// Recipient address
    pub to: String,
    /// Integer amount in base units
    #[serde(deserialize_with = "string_or_number")]
    #[schema(value_type = String)]
    pub amount: String,
    /// Asset selector: the token symbol (default) or `native` / `ETH`
    pub token: Option<String>,
}

/// Sponsored (account-abstraction) transfer body. Always the configured token.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct SponsoredSendRequest {
    pub to: String,
    #[serde(deserialize_with = "string_or_number")]
    #[schema(value_type = String)]
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TxHashResponse {
    pub tx_hash: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}
