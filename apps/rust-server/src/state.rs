// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::session::SessionManager;
use crate::blockchain::{BundlerSmartAccountClient, ChainClient, SmartAccountClient, SmartAccountError};
use crate::config::{AppConfig, StorageBackend};
use crate::custody::{CipherError, CustodyManager, KeyCipher};
use crate::execution::ExecutionEngine;
use crate::limits::{RateLimiter, SpendLimiter};
use crate::storage::{JsonFileUserStore, RedbUserStore, StorageError, UserStore};

/// Errors raised while assembling the application at startup.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to open record store: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to derive storage key: {0}")]
    Cipher(#[from] CipherError),

    #[error("failed to set up smart account client: {0}")]
    SmartAccount(#[from] SmartAccountError),
}

/// Shared request state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub custody: Arc<CustodyManager>,
    pub engine: Arc<ExecutionEngine>,
    pub spend: Arc<SpendLimiter>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Assemble state around an already-open store.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        smart_accounts: Option<Arc<dyn SmartAccountClient>>,
    ) -> Result<Self, StateError> {
        let cipher = KeyCipher::derive(&config.jwt_secret)?;
        let sessions = SessionManager::new(&config.jwt_secret);
        let custody = CustodyManager::new(store.clone(), cipher, sessions);

        let chain = ChainClient::new(config.network.clone());
        let engine = ExecutionEngine::new(chain, config.token.clone(), store, smart_accounts);

        Ok(Self {
            custody: Arc::new(custody),
            engine: Arc::new(engine),
            spend: Arc::new(SpendLimiter::new(config.spend_retention_days)),
            rate_limiter: Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute)),
            config: Arc::new(config),
        })
    }

    /// Open the configured store and build the bundler client, if any.
    pub fn from_config(config: AppConfig) -> Result<Self, StateError> {
        let store = open_store(&config.storage)?;
        tracing::info!(backend = store.backend(), "record store opened");

        let smart_accounts = match &config.account_abstraction {
            Some(aa) => {
                let chain = ChainClient::new(config.network.clone());
                let client = BundlerSmartAccountClient::new(chain, aa.clone())?;
                tracing::info!(
                    bundler = %aa.bundler_url.host_str().unwrap_or_default(),
                    entry_point = %aa.entry_point,
                    "account abstraction enabled"
                );
                Some(Arc::new(client) as Arc<dyn SmartAccountClient>)
            }
            None => {
                tracing::info!("account abstraction not configured; sponsored routes answer 501");
                None
            }
        };

        Self::new(config, store, smart_accounts)
    }
}

/// Open the backend selected by configuration.
pub fn open_store(backend: &StorageBackend) -> Result<Arc<dyn UserStore>, StorageError> {
    Ok(match backend {
        StorageBackend::Redb(path) => Arc::new(RedbUserStore::open(path)?),
        StorageBackend::JsonFile(dir) => Arc::new(JsonFileUserStore::open(dir)?),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::AppConfig;
    use std::path::Path;

    pub const TEST_TOKEN: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

    /// Configuration pointing at an unreachable node and a temp data dir.
    pub fn test_config(data_dir: &Path) -> AppConfig {
        let data_dir = data_dir.to_string_lossy().to_string();
        AppConfig::from_lookup(|name| match name {
            "JWT_SECRET" => Some("test-secret".to_string()),
            "RPC_URL" => Some("http://127.0.0.1:1".to_string()),
            "USDC_CONTRACT_ADDRESS" => Some(TEST_TOKEN.to_string()),
            "DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        })
        .unwrap()
    }

    pub fn test_state(data_dir: &Path) -> AppState {
        AppState::from_config(test_config(data_dir)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_backend_is_default() {
        let dir = TempDir::new().unwrap();
        let state = test_state(dir.path());
        assert_eq!(state.custody.store().backend(), "json-file");
        assert!(!state.engine.sponsorship_enabled());
        assert!(dir.path().join("users.json").exists());
    }

    #[test]
    fn redb_backend_when_database_path_set() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&StorageBackend::Redb(dir.path().join("db/users.redb"))).unwrap();
        assert_eq!(store.backend(), "redb");
        store.health_check().unwrap();
    }
}
