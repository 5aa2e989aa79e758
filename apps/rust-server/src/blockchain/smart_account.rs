// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Counterfactual smart accounts and sponsored user operations.
//!
//! ## Flow
//!
//! ```text
//! owner ──getAddress(owner, 0)──► smart account (cached by the caller)
//!
//! call ─► execute(target, value, data)
//!      ─► UserOperation { nonce from EntryPoint, initCode if undeployed }
//!      ─► pm_sponsorUserOperation (paymasterAndData + gas limits)
//!      ─► eth_estimateUserOperationGas (only for limits still missing)
//!      ─► sign userOpHash (EIP-191)
//!      ─► eth_sendUserOperation ─► userOpHash
//!
//! userOpHash ─► poll eth_getUserOperationReceipt ─► transaction hash
//! ```
//!
//! The account is a v0.6 SimpleAccount with salt 0 from the configured
//! factory. Addresses cached from a Biconomy v2 deployment belong to a
//! different account implementation and are rejected by the bundler; clear
//! `smartAccountAddress` on those records so it is derived again here.

use std::time::Duration;

use alloy::{
    primitives::{aliases::U192, Address, Bytes, B256, U256},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde_json::json;

use super::bundler::{GasLimits, JsonRpcClient, SponsorshipResult, UserOperationReceipt};
use super::client::{ChainClient, ChainError};
use super::types::AccountAbstractionConfig;
use super::user_operation::{dummy_signature, UserOperation};

sol! {
    #[sol(rpc)]
    interface ISimpleAccountFactory {
        function createAccount(address owner, uint256 salt) external returns (address ret);
        function getAddress(address owner, uint256 salt) external view returns (address);
    }

    interface ISimpleAccount {
        function execute(address dest, uint256 value, bytes calldata func) external;
    }

    #[sol(rpc)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// How long to wait for a bundled transaction hash.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between `eth_getUserOperationReceipt` polls.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Errors from the smart-account path.
#[derive(Debug, thiserror::Error)]
pub enum SmartAccountError {
    #[error("account abstraction is not configured")]
    NotConfigured,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("user operation reverted in transaction {tx_hash}")]
    Reverted { tx_hash: B256 },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// A call the smart account should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartAccountCall {
    pub target: Address,
    pub value: U256,
    pub data: Bytes,
}

/// `execute(target, value, data)` calldata for the smart account.
pub fn encode_execute(call: &SmartAccountCall) -> Bytes {
    ISimpleAccount::executeCall {
        dest: call.target,
        value: call.value,
        func: call.data.clone(),
    }
    .abi_encode()
    .into()
}

/// `factory ++ createAccount(owner, 0)`, deploying the account on first use.
pub fn init_code(factory: Address, owner: Address) -> Bytes {
    let mut code = factory.to_vec();
    code.extend(
        ISimpleAccountFactory::createAccountCall {
            owner,
            salt: U256::ZERO,
        }
        .abi_encode(),
    );
    code.into()
}

/// Smart-account operations used by the execution engine.
#[async_trait]
pub trait SmartAccountClient: Send + Sync {
    /// Counterfactual address of the account owned by `owner`.
    async fn account_address(&self, owner: Address) -> Result<Address, SmartAccountError>;

    /// Build, sponsor, sign and submit a user operation. Returns its hash.
    async fn submit(
        &self,
        signer: &PrivateKeySigner,
        sender: Address,
        call: SmartAccountCall,
    ) -> Result<B256, SmartAccountError>;

    /// Transaction hash that included the operation, or `None` if none
    /// appeared before the deadline.
    async fn wait_for_transaction(&self, user_op_hash: B256) -> Result<Option<B256>, SmartAccountError>;
}

/// [`SmartAccountClient`] backed by a bundler and a sponsoring paymaster.
pub struct BundlerSmartAccountClient {
    chain: ChainClient,
    config: AccountAbstractionConfig,
    bundler: JsonRpcClient,
    paymaster: JsonRpcClient,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl BundlerSmartAccountClient {
    pub fn new(chain: ChainClient, config: AccountAbstractionConfig) -> Result<Self, SmartAccountError> {
        let bundler = JsonRpcClient::new(config.bundler_url.clone())?;
        let paymaster = JsonRpcClient::new(config.paymaster_url.clone())?;
        Ok(Self {
            chain,
            config,
            bundler,
            paymaster,
            receipt_timeout: RECEIPT_TIMEOUT,
            poll_interval: RECEIPT_POLL_INTERVAL,
        })
    }

    /// Override receipt polling.
    pub fn with_polling(mut self, timeout: Duration, interval: Duration) -> Self {
        self.receipt_timeout = timeout;
        self.poll_interval = interval;
        self
    }

    async fn nonce(&self, sender: Address) -> Result<U256, SmartAccountError> {
        IEntryPoint::new(self.config.entry_point, self.chain.provider().clone())
            .getNonce(sender, U192::ZERO)
            .call()
            .await
            .map_err(|e| ChainError::Contract(e.to_string()).into())
    }
}

#[async_trait]
impl SmartAccountClient for BundlerSmartAccountClient {
    async fn account_address(&self, owner: Address) -> Result<Address, SmartAccountError> {
        let address = ISimpleAccountFactory::new(self.config.factory, self.chain.provider().clone())
            .getAddress(owner, U256::ZERO)
            .call()
            .await
            .map_err(|e| ChainError::Contract(e.to_string()))?;
        tracing::debug!(owner = %owner, smart_account = %address, "derived smart account");
        Ok(address)
    }

    async fn submit(
        &self,
        signer: &PrivateKeySigner,
        sender: Address,
        call: SmartAccountCall,
    ) -> Result<B256, SmartAccountError> {
        let deployed = !self.chain.code_at(sender).await?.is_empty();
        let nonce = self.nonce(sender).await?;
        let (max_fee, max_priority_fee) = self.chain.eip1559_fees().await?;

        let mut op = UserOperation {
            sender,
            nonce,
            init_code: if deployed {
                Bytes::new()
            } else {
                init_code(self.config.factory, signer.address())
            },
            call_data: encode_execute(&call),
            max_fee_per_gas: U256::from(max_fee),
            max_priority_fee_per_gas: U256::from(max_priority_fee),
            signature: dummy_signature(),
            ..Default::default()
        };

        apply_sponsorship(&self.paymaster, &self.bundler, &mut op, self.config.entry_point).await?;

        let local_hash = op
            .sign(signer, self.config.entry_point, self.chain.network().chain_id)
            .map_err(|e| SmartAccountError::Signing(e.to_string()))?;

        let returned: Option<B256> = self
            .bundler
            .call("eth_sendUserOperation", (&op, self.config.entry_point))
            .await?;

        let user_op_hash = match returned {
            Some(hash) if hash != local_hash => {
                tracing::warn!(local = %local_hash, bundler = %hash, "bundler returned a different userOpHash");
                hash
            }
            Some(hash) => hash,
            None => local_hash,
        };
        tracing::info!(
            sender = %sender,
            user_op_hash = %user_op_hash,
            deployed,
            "user operation submitted"
        );
        Ok(user_op_hash)
    }

    async fn wait_for_transaction(&self, user_op_hash: B256) -> Result<Option<B256>, SmartAccountError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            match self
                .bundler
                .call::<_, UserOperationReceipt>("eth_getUserOperationReceipt", [user_op_hash])
                .await
            {
                Ok(Some(receipt)) => {
                    if let Some(tx_hash) = receipt.transaction_hash() {
                        if receipt.success == Some(false) {
                            return Err(SmartAccountError::Reverted { tx_hash });
                        }
                        return Ok(Some(tx_hash));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(user_op_hash = %user_op_hash, error = %e, "receipt poll failed");
                }
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                tracing::warn!(user_op_hash = %user_op_hash, "no transaction hash before deadline");
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Fill `paymasterAndData` and gas limits.
///
/// The paymaster is asked first. Limits it leaves out are estimated by the
/// bundler against the sponsored operation.
pub async fn apply_sponsorship(
    paymaster: &JsonRpcClient,
    bundler: &JsonRpcClient,
    op: &mut UserOperation,
    entry_point: Address,
) -> Result<(), SmartAccountError> {
    let context = json!({ "mode": "SPONSORED", "calculateGasLimits": true });
    let sponsorship: SponsorshipResult = paymaster
        .call("pm_sponsorUserOperation", (&*op, context))
        .await?
        .ok_or_else(|| SmartAccountError::InvalidResponse("paymaster declined to sponsor".to_string()))?;

    op.paymaster_and_data = sponsorship.paymaster_and_data;
    fill_gas(op, &sponsorship.gas);

    if missing_gas(op) {
        let estimate: GasLimits = bundler
            .call("eth_estimateUserOperationGas", (&*op, entry_point))
            .await?
            .unwrap_or_default();
        fill_gas(op, &estimate);
    }

    if missing_gas(op) {
        return Err(SmartAccountError::InvalidResponse(
            "no gas limits from paymaster or bundler".to_string(),
        ));
    }
    Ok(())
}

fn fill_gas(op: &mut UserOperation, limits: &GasLimits) {
    for (slot, value) in [
        (&mut op.call_gas_limit, limits.call_gas_limit),
        (&mut op.verification_gas_limit, limits.verification_gas_limit),
        (&mut op.pre_verification_gas, limits.pre_verification_gas),
    ] {
        if let Some(value) = value {
            if slot.is_zero() {
                *slot = value;
            }
        }
    }
}

fn missing_gas(op: &UserOperation) -> bool {
    op.call_gas_limit.is_zero() || op.verification_gas_limit.is_zero() || op.pre_verification_gas.is_zero()
}
