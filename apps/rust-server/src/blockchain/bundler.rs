// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC client for ERC-4337 bundler and paymaster endpoints.
//!
//! Bundler and paymaster responses are not uniform across vendors: gas
//! quantities may come back as hex strings, decimal strings or bare
//! numbers. The response types here accept all three.

use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy::primitives::{Bytes, B256, U256};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

use super::smart_account::SmartAccountError;

/// Per-request timeout for bundler and paymaster calls.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP.
pub struct JsonRpcClient {
    http: Client,
    url: Url,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> Result<Self, SmartAccountError> {
        let http = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| SmartAccountError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    /// Invoke `method`. A `null` result is returned as `None`.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<Option<R>, SmartAccountError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| SmartAccountError::Transport(format!("{method} request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SmartAccountError::Transport(format!(
                "{method} returned {status}: {body}"
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| SmartAccountError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(error) = body.error {
            return Err(SmartAccountError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        match body.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SmartAccountError::InvalidResponse(format!("{method}: {e}"))),
        }
    }
}

/// Reply to `pm_sponsorUserOperation`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipResult {
    pub paymaster_and_data: Bytes,
    #[serde(flatten)]
    pub gas: GasLimits,
}

/// Gas limits as returned by a paymaster or `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasLimits {
    #[serde(default, deserialize_with = "optional_quantity")]
    pub call_gas_limit: Option<U256>,
    #[serde(default, deserialize_with = "optional_quantity")]
    pub verification_gas_limit: Option<U256>,
    #[serde(default, deserialize_with = "optional_quantity")]
    pub pre_verification_gas: Option<U256>,
}

/// Reply to `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub receipt: Option<BundleReceipt>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    pub transaction_hash: B256,
}

impl UserOperationReceipt {
    pub fn transaction_hash(&self) -> Option<B256> {
        self.receipt.as_ref().map(|r| r.transaction_hash)
    }
}

fn optional_quantity<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Number(u64),
        Text(String),
    }

    match Option::<Quantity>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Quantity::Number(n)) => Ok(Some(U256::from(n))),
        Some(Quantity::Text(s)) => U256::from_str(s.trim())
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
