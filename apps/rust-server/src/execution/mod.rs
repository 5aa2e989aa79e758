// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Execution Engine
//!
//! One entry point, [`ExecutionEngine::execute`], dispatches a
//! [`TransferKind`]:
//!
//! ```text
//! Direct:     Built ─► Submitted ─► Confirmed
//!                                 ├► TimedOut { tx_hash }
//!                                 └► Failed
//!
//! Sponsored:  AccountResolved ─► Encoded ─► Submitted ─► HashObtained
//!                                                      ├► SubmissionIncomplete { user_op_hash }
//!                                                      └► Failed
//! ```
//!
//! Nothing is retried. Once a transaction is signed the request runs to
//! completion or deadline.

mod error;

pub use error::ExecutionError;

use std::{str::FromStr, sync::Arc, time::Duration};

use alloy::primitives::{Address, B256, U256};

use crate::blockchain::{
    erc20::transfer_calldata,
    history::{self, TransferRecord},
    transactions::{self, build_transfer, CONFIRMATION_TIMEOUT},
    Asset, ChainClient, DirectOutcome, SmartAccountCall, SmartAccountClient, TokenConfig,
};
use crate::custody::CustodialKey;
use crate::storage::{RecordField, UserRecord, UserStore};

/// A directly signed transfer from the account's own address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectTransfer {
    pub to: Address,
    pub amount: U256,
    pub asset: Asset,
}

/// A configured-token transfer from the account's smart account, gas paid
/// by the paymaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsoredTransfer {
    pub to: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferKind {
    Direct(DirectTransfer),
    Sponsored(SponsoredTransfer),
}

/// A transfer that reached the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub tx_hash: B256,
    pub user_op_hash: Option<B256>,
}

/// Point-in-time balances in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balances {
    pub native: U256,
    pub token: U256,
}

/// Parse a recipient address.
pub fn parse_recipient(raw: &str) -> Result<Address, ExecutionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExecutionError::BadRequest("Missing to/amount".to_string()));
    }
    Address::from_str(raw).map_err(|_| ExecutionError::BadRequest(format!("Invalid recipient address: {raw}")))
}

/// Parse a positive integer amount in base units. No decimal scaling.
pub fn parse_amount(raw: &str) -> Result<U256, ExecutionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExecutionError::BadRequest("Missing to/amount".to_string()));
    }
    let amount = U256::from_str(raw)
        .map_err(|_| ExecutionError::BadRequest(format!("Invalid amount: {raw}")))?;
    if amount.is_zero() {
        return Err(ExecutionError::BadRequest("Amount must be positive".to_string()));
    }
    Ok(amount)
}

/// Executes transfers and chain reads on behalf of accounts.
pub struct ExecutionEngine {
    chain: ChainClient,
    token: TokenConfig,
    store: Arc<dyn UserStore>,
    smart_accounts: Option<Arc<dyn SmartAccountClient>>,
    confirmation_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(
        chain: ChainClient,
        token: TokenConfig,
        store: Arc<dyn UserStore>,
        smart_accounts: Option<Arc<dyn SmartAccountClient>>,
    ) -> Self {
        Self {
            chain,
            token,
            store,
            smart_accounts,
            confirmation_timeout: CONFIRMATION_TIMEOUT,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn token(&self) -> &TokenConfig {
        &self.token
    }

    /// Whether bundler and paymaster are configured.
    pub fn sponsorship_enabled(&self) -> bool {
        self.smart_accounts.is_some()
    }

    fn smart_accounts(&self) -> Result<&Arc<dyn SmartAccountClient>, ExecutionError> {
        self.smart_accounts.as_ref().ok_or(ExecutionError::NotConfigured)
    }

    /// Run a transfer for `record`, signing with `key`.
    pub async fn execute(
        &self,
        record: &UserRecord,
        key: &CustodialKey,
        kind: TransferKind,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        match kind {
            TransferKind::Direct(transfer) => self.execute_direct(record, key, transfer).await,
            TransferKind::Sponsored(transfer) => self.execute_sponsored(record, key, transfer).await,
        }
    }

    async fn execute_direct(
        &self,
        record: &UserRecord,
        key: &CustodialKey,
        transfer: DirectTransfer,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        let provider = self.chain.signing_provider(key.signer()?);
        let tx = build_transfer(transfer.asset, transfer.to, transfer.amount);

        tracing::info!(
            account = %record.id,
            to = %transfer.to,
            amount = %transfer.amount,
            asset = ?transfer.asset,
            "direct transfer"
        );

        match transactions::send_and_confirm(&provider, tx, self.confirmation_timeout).await? {
            DirectOutcome::Confirmed { tx_hash, .. } => Ok(ExecutionReceipt {
                tx_hash,
                user_op_hash: None,
            }),
            DirectOutcome::TimedOut { tx_hash } => Err(ExecutionError::TimedOut { tx_hash }),
        }
    }

    async fn execute_sponsored(
        &self,
        record: &UserRecord,
        key: &CustodialKey,
        transfer: SponsoredTransfer,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        let client = self.smart_accounts()?;
        let signer = key.signer()?;
        let sender = self.smart_account_address(record, signer.address()).await?;

        let call = SmartAccountCall {
            target: self.token.address,
            value: U256::ZERO,
            data: transfer_calldata(transfer.to, transfer.amount),
        };

        tracing::info!(
            account = %record.id,
            smart_account = %sender,
            to = %transfer.to,
            amount = %transfer.amount,
            "sponsored transfer"
        );

        let user_op_hash = client.submit(&signer, sender, call).await?;
        match client.wait_for_transaction(user_op_hash).await? {
            Some(tx_hash) => Ok(ExecutionReceipt {
                tx_hash,
                user_op_hash: Some(user_op_hash),
            }),
            None => Err(ExecutionError::SubmissionIncomplete { user_op_hash }),
        }
    }

    /// Smart-account address for `record`: the cached value, or one derived
    /// from the factory and cached with set-if-absent.
    pub async fn smart_account_address(
        &self,
        record: &UserRecord,
        owner: Address,
    ) -> Result<Address, ExecutionError> {
        if let Some(cached) = record.smart_account_address.as_deref() {
            return Address::from_str(cached)
                .map_err(|_| ExecutionError::Failed(format!("stored smart account is malformed: {cached}")));
        }

        let derived = self.smart_accounts()?.account_address(owner).await?;
        let written = self.store.set_field_if_absent(
            &record.id,
            RecordField::SmartAccountAddress,
            &derived.to_checksum(None),
        )?;
        if written {
            tracing::info!(account = %record.id, smart_account = %derived, "smart account cached");
            return Ok(derived);
        }

        // Another request cached first; the stored value wins.
        let stored = self
            .store
            .get(&record.id)?
            .and_then(|r| r.smart_account_address)
            .and_then(|a| Address::from_str(&a).ok());
        Ok(stored.unwrap_or(derived))
    }

    pub async fn balances(&self, account: Address) -> Result<Balances, ExecutionError> {
        let (native, token) = tokio::try_join!(
            self.chain.native_balance(account),
            self.chain.token_balance(self.token.address, account),
        )?;
        Ok(Balances { native, token })
    }

    /// Configured-token transfers touching `account` in the lookback window.
    pub async fn history(&self, account: Address) -> Result<Vec<TransferRecord>, ExecutionError> {
        Ok(history::token_transfers(&self.chain, self.token.address, account).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{NetworkConfig, SmartAccountError};
    use crate::storage::JsonFileUserStore;
    use alloy::primitives::address;
    use alloy::signers::local::PrivateKeySigner;
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use tempfile::TempDir;

    const TOKEN: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");
    const RECIPIENT: Address = address!("2B5AD5c4795c026514f8317c7a215E218DcCD6cF");
    const SMART_ACCOUNT: Address = address!("1111111111111111111111111111111111111111");
    const OTHER_ACCOUNT: Address = address!("2222222222222222222222222222222222222222");

    #[derive(Default)]
    struct FakeSmartAccounts {
        derivations: AtomicUsize,
        submitted: Mutex<Vec<(Address, SmartAccountCall)>>,
        tx_hash: Option<B256>,
    }

    #[async_trait]
    impl SmartAccountClient for FakeSmartAccounts {
        async fn account_address(&self, _owner: Address) -> Result<Address, SmartAccountError> {
            self.derivations.fetch_add(1, Ordering::SeqCst);
            Ok(SMART_ACCOUNT)
        }

        async fn submit(
            &self,
            _signer: &PrivateKeySigner,
            sender: Address,
            call: SmartAccountCall,
        ) -> Result<B256, SmartAccountError> {
            self.submitted.lock().unwrap().push((sender, call));
            Ok(B256::repeat_byte(0xaa))
        }

        async fn wait_for_transaction(&self, _user_op_hash: B256) -> Result<Option<B256>, SmartAccountError> {
            Ok(self.tx_hash)
        }
    }

    struct Fixture {
        engine: ExecutionEngine,
        store: Arc<dyn UserStore>,
        fake: Option<Arc<FakeSmartAccounts>>,
        _dir: TempDir,
    }

    fn fixture(fake: Option<FakeSmartAccounts>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn UserStore> = Arc::new(JsonFileUserStore::open(dir.path()).unwrap());
        let chain = ChainClient::new(NetworkConfig {
            rpc_url: "http://127.0.0.1:1".parse().unwrap(),
            chain_id: 84532,
        });
        let token = TokenConfig {
            address: TOKEN,
            symbol: "USDC".into(),
        };
        let fake = fake.map(Arc::new);
        let client = fake.clone().map(|f| f as Arc<dyn SmartAccountClient>);
        Fixture {
            engine: ExecutionEngine::new(chain, token, store.clone(), client),
            store,
            fake,
            _dir: dir,
        }
    }

    fn record(store: &Arc<dyn UserStore>, smart_account: Option<Address>) -> UserRecord {
        let record = UserRecord {
            id: "a@x.com".into(),
            password_hash: Some("hash".into()),
            smart_account_address: smart_account.map(|a| a.to_checksum(None)),
            ..Default::default()
        };
        store.save(&record).unwrap();
        record
    }

    fn sponsored() -> TransferKind {
        TransferKind::Sponsored(SponsoredTransfer {
            to: RECIPIENT,
            amount: U256::from(1_000),
        })
    }

    #[test]
    fn parses_amounts_and_recipients() {
        assert_eq!(parse_amount("1000").unwrap(), U256::from(1000));
        assert_eq!(parse_amount("0x10").unwrap(), U256::from(16));
        assert!(matches!(parse_amount("0"), Err(ExecutionError::BadRequest(_))));
        assert!(matches!(parse_amount("1.5"), Err(ExecutionError::BadRequest(_))));
        assert!(matches!(parse_amount(""), Err(ExecutionError::BadRequest(_))));

        assert_eq!(parse_recipient(&RECIPIENT.to_string()).unwrap(), RECIPIENT);
        assert!(matches!(parse_recipient("0x1234"), Err(ExecutionError::BadRequest(_))));
    }

    #[tokio::test]
    async fn sponsored_without_configuration_is_not_configured() {
        let f = fixture(None);
        let record = record(&f.store, None);
        let key = CustodialKey::generate();

        assert!(!f.engine.sponsorship_enabled());
        let err = f.engine.execute(&record, &key, sponsored()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotConfigured));
    }

    #[tokio::test]
    async fn cached_smart_account_is_reused_without_derivation() {
        let f = fixture(Some(FakeSmartAccounts::default()));
        let record = record(&f.store, Some(OTHER_ACCOUNT));

        let address = f.engine.smart_account_address(&record, RECIPIENT).await.unwrap();
        assert_eq!(address, OTHER_ACCOUNT);
        assert_eq!(f.fake.as_ref().unwrap().derivations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn derived_smart_account_is_cached() {
        let f = fixture(Some(FakeSmartAccounts::default()));
        let record = record(&f.store, None);

        let address = f.engine.smart_account_address(&record, RECIPIENT).await.unwrap();
        assert_eq!(address, SMART_ACCOUNT);

        let stored = f.store.get("a@x.com").unwrap().unwrap();
        assert_eq!(stored.smart_account_address, Some(SMART_ACCOUNT.to_checksum(None)));

        let again = f.engine.smart_account_address(&stored, RECIPIENT).await.unwrap();
        assert_eq!(again, SMART_ACCOUNT);
        assert_eq!(f.fake.as_ref().unwrap().derivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_record_does_not_overwrite_cached_account() {
        let f = fixture(Some(FakeSmartAccounts::default()));
        let stale = record(&f.store, None);
        f.store
            .set_field("a@x.com", RecordField::SmartAccountAddress, &OTHER_ACCOUNT.to_checksum(None))
            .unwrap();

        let address = f.engine.smart_account_address(&stale, RECIPIENT).await.unwrap();
        assert_eq!(address, OTHER_ACCOUNT);
        let stored = f.store.get("a@x.com").unwrap().unwrap();
        assert_eq!(stored.smart_account_address, Some(OTHER_ACCOUNT.to_checksum(None)));
    }

    #[tokio::test]
    async fn sponsored_transfer_wraps_token_call() {
        let f = fixture(Some(FakeSmartAccounts {
            tx_hash: Some(B256::repeat_byte(0xbb)),
            ..Default::default()
        }));
        let record = record(&f.store, None);
        let key = CustodialKey::generate();

        let receipt = f.engine.execute(&record, &key, sponsored()).await.unwrap();
        assert_eq!(receipt.tx_hash, B256::repeat_byte(0xbb));
        assert_eq!(receipt.user_op_hash, Some(B256::repeat_byte(0xaa)));

        let submitted = f.fake.as_ref().unwrap().submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        let (sender, call) = &submitted[0];
        assert_eq!(*sender, SMART_ACCOUNT);
        assert_eq!(call.target, TOKEN);
        assert_eq!(call.value, U256::ZERO);
        assert_eq!(call.data, transfer_calldata(RECIPIENT, U256::from(1_000)));
    }

    #[tokio::test]
    async fn missing_transaction_hash_is_incomplete_not_failed() {
        let f = fixture(Some(FakeSmartAccounts::default()));
        let record = record(&f.store, Some(SMART_ACCOUNT));
        let key = CustodialKey::generate();

        match f.engine.execute(&record, &key, sponsored()).await {
            Err(ExecutionError::SubmissionIncomplete { user_op_hash }) => {
                assert_eq!(user_op_hash, B256::repeat_byte(0xaa));
            }
            other => panic!("expected SubmissionIncomplete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_transfer_against_dead_node_fails() {
        let f = fixture(None);
        let record = record(&f.store, None);
        let key = CustodialKey::generate();
        let kind = TransferKind::Direct(DirectTransfer {
            to: RECIPIENT,
            amount: U256::from(1),
            asset: Asset::Native,
        });

        let err = f.engine.execute(&record, &key, kind).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed(_)));
    }
}
