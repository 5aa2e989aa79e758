// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential & Key Custody
//!
//! Owns the lifecycle of an account's credentials and its custodial key:
//!
//! - account creation (key generated locally, encrypted before it is stored)
//! - password verification with one-way migration of legacy plaintext
//!   passwords and keys
//! - decryption of the custodial key for the duration of one request
//! - session issuance and verification
//!
//! ## Legacy Records
//!
//! Records written by earlier deployments may carry a plaintext `password`
//! and/or plaintext `privateKey`, a bcrypt `passwordHash`, or a ciphertext
//! under the earlier scrypt-derived key. A successful sign-in rewrites them
//! as Argon2id / current-key ciphertext in the same store write. A plaintext
//! key that does not parse is left in place for an operator to recover.
//! A record with neither ciphertext nor plaintext key is never given a fresh
//! key here; it is reported as [`CustodyError::MigrationRequired`].

pub mod crypto;
pub mod keys;
pub mod password;

use std::sync::Arc;

use alloy::primitives::Address;

pub use crypto::{CipherError, KeyCipher};
pub use keys::{CustodialKey, KeyError};

use crate::auth::session::{SessionClaims, SessionError, SessionManager};
use crate::storage::{RecordField, StorageError, UserRecord, UserStore};

/// Errors surfaced by the custody layer.
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("account already exists")]
    Conflict,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account requires migration")]
    MigrationRequired { address: Option<String> },

    #[error("unauthorized")]
    Unauthorized,

    #[error("custodial key could not be decrypted")]
    DecryptionFailed,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal custody error: {0}")]
    Internal(String),
}

impl From<SessionError> for CustodyError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Signing(msg) => CustodyError::Internal(msg),
            _ => CustodyError::Unauthorized,
        }
    }
}

/// Result of a successful sign-up or sign-in.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub token: String,
    pub address: Address,
}

/// Credential and custodial-key manager.
pub struct CustodyManager {
    store: Arc<dyn UserStore>,
    cipher: KeyCipher,
    sessions: SessionManager,
}

impl CustodyManager {
    pub fn new(store: Arc<dyn UserStore>, cipher: KeyCipher, sessions: SessionManager) -> Self {
        Self {
            store,
            cipher,
            sessions,
        }
    }

    /// The record store shared with the execution layer.
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Create an account with a freshly generated custodial key.
    pub fn create_account(&self, id: &str, password: &str) -> Result<SessionGrant, CustodyError> {
        let id = validate_credentials(id, password)?;

        if self.store.get(id)?.is_some() {
            return Err(CustodyError::Conflict);
        }

        let key = CustodialKey::generate();
        let address = key.address().map_err(|e| CustodyError::Internal(e.to_string()))?;
        let record = UserRecord {
            id: id.to_string(),
            password_hash: Some(hash(password)?),
            custodial_key_ciphertext: Some(self.encrypt_key(&key)?),
            primary_address: Some(address.to_checksum(None)),
            ..Default::default()
        };

        match self.store.create(&record) {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => return Err(CustodyError::Conflict),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(account = %id, address = %address, "account created");

        let token = self.issue_session(id, Some(address))?;
        Ok(SessionGrant { token, address })
    }

    /// Verify credentials, migrating legacy plaintext fields on success.
    pub fn authenticate(&self, id: &str, password: &str) -> Result<SessionGrant, CustodyError> {
        let id = validate_credentials(id, password)?;
        let mut record = self.store.get(id)?.ok_or(CustodyError::InvalidCredentials)?;

        let mut dirty = self.check_password(&mut record, password)?;
        let key = self.resolve_key(&mut record, &mut dirty);

        if dirty {
            self.store.save(&record)?;
        }

        let key = match key? {
            Some(key) => key,
            None => {
                tracing::warn!(account = %id, "account has no custodial key; migration required");
                return Err(CustodyError::MigrationRequired {
                    address: record.primary_address.clone(),
                });
            }
        };

        let address = key.address().map_err(|e| CustodyError::Internal(e.to_string()))?;
        self.reconcile_address(&record, address)?;

        let token = self.issue_session(id, Some(address))?;
        Ok(SessionGrant { token, address })
    }

    /// Returns `true` when the record changed (legacy password upgraded).
    fn check_password(&self, record: &mut UserRecord, password: &str) -> Result<bool, CustodyError> {
        if let Some(stored) = record.password_hash.as_deref() {
            if !password::verify_password(password, stored) {
                return Err(CustodyError::InvalidCredentials);
            }
            if !password::is_legacy_hash(stored) {
                return Ok(false);
            }
            record.password_hash = Some(hash(password)?);
            record.legacy_password = None;
            tracing::info!(account = %record.id, "bcrypt hash migrated to argon2");
            return Ok(true);
        }

        match record.legacy_password.as_deref() {
            Some(legacy) if password::legacy_password_matches(password, legacy) => {
                record.password_hash = Some(hash(password)?);
                record.legacy_password = None;
                tracing::info!(account = %record.id, "legacy password migrated to hash");
                Ok(true)
            }
            _ => Err(CustodyError::InvalidCredentials),
        }
    }

    /// Find a usable key on the record, encrypting a legacy plaintext key
    /// in place. `Ok(None)` means the record has no key material at all.
    fn resolve_key(
        &self,
        record: &mut UserRecord,
        dirty: &mut bool,
    ) -> Result<Option<CustodialKey>, CustodyError> {
        if let Some(ciphertext) = record.custodial_key_ciphertext.as_deref() {
            match self.decrypt_payload(ciphertext) {
                Ok((key, reencrypt)) => {
                    if reencrypt {
                        record.custodial_key_ciphertext = Some(self.encrypt_key(&key)?);
                        *dirty = true;
                        tracing::info!(account = %record.id, "custodial key re-encrypted under current key");
                    }
                    if record.legacy_private_key.take().is_some() {
                        *dirty = true;
                    }
                    return Ok(Some(key));
                }
                Err(_) if record.legacy_private_key.is_some() => {
                    tracing::warn!(account = %record.id, "ciphertext unreadable; re-encrypting legacy key");
                }
                Err(_) => {
                    tracing::warn!(account = %record.id, "custodial key decryption failed at sign-in");
                    return Err(CustodyError::InvalidCredentials);
                }
            }
        }

        let Some(legacy) = record.legacy_private_key.as_deref() else {
            return Ok(None);
        };
        let key = match CustodialKey::from_hex(legacy) {
            Ok(key) => key,
            Err(e) => {
                // Left on the record; only an operator can repair it.
                tracing::warn!(account = %record.id, error = %e, "legacy private key is unusable");
                return Ok(None);
            }
        };

        record.custodial_key_ciphertext = Some(self.encrypt_key(&key)?);
        record.legacy_private_key = None;
        *dirty = true;
        tracing::info!(account = %record.id, "legacy private key encrypted");
        Ok(Some(key))
    }

    /// Backfill a missing primary address; never overwrite a stored one.
    fn reconcile_address(&self, record: &UserRecord, derived: Address) -> Result<(), CustodyError> {
        match record.primary_address.as_deref() {
            None => {
                self.store.set_field_if_absent(
                    &record.id,
                    RecordField::PrimaryAddress,
                    &derived.to_checksum(None),
                )?;
            }
            Some(stored) => {
                if stored.parse::<Address>().ok() != Some(derived) {
                    tracing::warn!(
                        account = %record.id,
                        stored = %stored,
                        derived = %derived,
                        "stored address does not match custodial key"
                    );
                }
            }
        }
        Ok(())
    }

    /// Decrypt the record's ciphertext.
    pub fn decrypt_custodial_key(&self, record: &UserRecord) -> Result<CustodialKey, CustodyError> {
        let ciphertext = record
            .custodial_key_ciphertext
            .as_deref()
            .ok_or(CustodyError::DecryptionFailed)?;
        self.decrypt_payload(ciphertext).map(|(key, _)| key)
    }

    /// Key for a signing operation: ciphertext first, then legacy plaintext.
    pub fn signing_key(&self, record: &UserRecord) -> Result<CustodialKey, CustodyError> {
        if record.custodial_key_ciphertext.is_some() {
            return self.decrypt_custodial_key(record).inspect_err(|_| {
                tracing::warn!(account = %record.id, "custodial key decryption failed");
            });
        }
        match record.legacy_private_key.as_deref() {
            Some(legacy) => {
                CustodialKey::from_hex(legacy).map_err(|_| CustodyError::MigrationRequired {
                    address: record.primary_address.clone(),
                })
            }
            None => Err(CustodyError::MigrationRequired {
                address: record.primary_address.clone(),
            }),
        }
    }

    /// Stored primary address, or one derived from the key and backfilled.
    pub fn primary_address(&self, record: &UserRecord) -> Result<Address, CustodyError> {
        if let Some(address) = record.primary_address.as_deref().and_then(|a| a.parse().ok()) {
            return Ok(address);
        }
        let key = self.signing_key(record)?;
        let address = key.address().map_err(|e| CustodyError::Internal(e.to_string()))?;
        self.reconcile_address(record, address)?;
        Ok(address)
    }

    pub fn issue_session(&self, id: &str, address: Option<Address>) -> Result<String, CustodyError> {
        Ok(self.sessions.issue(id, address)?)
    }

    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.sessions.verify(token)
    }

    /// Load the account behind verified session claims.
    pub fn account_for_session(&self, claims: &SessionClaims) -> Result<UserRecord, CustodyError> {
        self.store.get(&claims.sub)?.ok_or(CustodyError::Unauthorized)
    }

    fn encrypt_key(&self, key: &CustodialKey) -> Result<String, CustodyError> {
        self.cipher
            .encrypt(key.to_hex().as_bytes())
            .map_err(|e| CustodyError::Internal(e.to_string()))
    }

    /// Decrypt under the current key, then the earlier one. The flag is set
    /// when the earlier key was needed and the payload should be rewritten.
    fn decrypt_payload(&self, ciphertext: &str) -> Result<(CustodialKey, bool), CustodyError> {
        let (plaintext, legacy) = match self.cipher.decrypt(ciphertext) {
            Ok(plaintext) => (plaintext, false),
            Err(_) => {
                let plaintext = self
                    .cipher
                    .decrypt_legacy(ciphertext)
                    .map_err(|_| CustodyError::DecryptionFailed)?;
                (plaintext, true)
            }
        };
        let text = std::str::from_utf8(&plaintext).map_err(|_| CustodyError::DecryptionFailed)?;
        let key = CustodialKey::from_hex(text).map_err(|_| CustodyError::DecryptionFailed)?;
        Ok((key, legacy))
    }
}

fn validate_credentials<'a>(id: &'a str, password: &str) -> Result<&'a str, CustodyError> {
    let id = id.trim();
    if id.is_empty() || password.is_empty() {
        return Err(CustodyError::BadRequest("Missing email/password".to_string()));
    }
    Ok(id)
}

fn hash(password: &str) -> Result<String, CustodyError> {
    password::hash_password(password).map_err(|e| CustodyError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileUserStore;
    use tempfile::TempDir;

    const LEGACY_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const LEGACY_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    fn manager_with_secret(secret: &str, dir: &TempDir) -> CustodyManager {
        let store: Arc<dyn UserStore> = Arc::new(JsonFileUserStore::open(dir.path()).unwrap());
        CustodyManager::new(
            store,
            KeyCipher::derive(secret).unwrap(),
            SessionManager::new(secret),
        )
    }

    fn manager() -> (CustodyManager, TempDir) {
        let dir = TempDir::new().unwrap();
        (manager_with_secret("test-secret", &dir), dir)
    }

    /// Write a record straight into `users.json`, bypassing the store's
    /// normalization so legacy plaintext fields survive.
    fn insert_legacy(dir: &TempDir, id: &str, record: serde_json::Value) {
        let path = dir.path().join("users.json");
        let mut map: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        map[id] = record;
        std::fs::write(&path, map.to_string()).unwrap();
    }

    #[test]
    fn signup_then_signin_returns_same_address() {
        let (custody, _dir) = manager();
        let created = custody.create_account("a@x.com", "pw1").unwrap();
        let signed_in = custody.authenticate("a@x.com", "pw1").unwrap();
        assert_eq!(created.address, signed_in.address);

        let claims = custody.verify_session(&signed_in.token).unwrap();
        assert_eq!(claims.sub, "a@x.com");
        assert_eq!(claims.address, Some(created.address.to_checksum(None)));
    }

    #[test]
    fn wrong_password_is_invalid_credentials() {
        let (custody, _dir) = manager();
        custody.create_account("a@x.com", "pw1").unwrap();
        assert!(matches!(
            custody.authenticate("a@x.com", "pw2"),
            Err(CustodyError::InvalidCredentials)
        ));
        assert!(matches!(
            custody.authenticate("nobody@x.com", "pw1"),
            Err(CustodyError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_signup_conflicts() {
        let (custody, _dir) = manager();
        custody.create_account("a@x.com", "pw1").unwrap();
        assert!(matches!(
            custody.create_account("a@x.com", "other"),
            Err(CustodyError::Conflict)
        ));
    }

    #[test]
    fn empty_fields_are_bad_requests() {
        let (custody, _dir) = manager();
        assert!(matches!(
            custody.create_account("  ", "pw"),
            Err(CustodyError::BadRequest(_))
        ));
        assert!(matches!(
            custody.authenticate("a@x.com", ""),
            Err(CustodyError::BadRequest(_))
        ));
    }

    #[test]
    fn stored_key_is_encrypted_and_decryptable() {
        let (custody, _dir) = manager();
        let created = custody.create_account("a@x.com", "pw1").unwrap();
        let record = custody.store().get("a@x.com").unwrap().unwrap();

        let ciphertext = record.custodial_key_ciphertext.as_deref().unwrap();
        assert!(!ciphertext.contains("0x"));
        let key = custody.decrypt_custodial_key(&record).unwrap();
        assert_eq!(key.address().unwrap(), created.address);
    }

    #[test]
    fn legacy_password_is_migrated_once() {
        let (custody, dir) = manager();
        insert_legacy(
            &dir,
            "old@x.com",
            serde_json::json!({ "password": "p", "privateKey": LEGACY_KEY }),
        );

        let grant = custody.authenticate("old@x.com", "p").unwrap();
        assert_eq!(grant.address, LEGACY_ADDRESS.parse::<Address>().unwrap());

        let stored = custody.store().get("old@x.com").unwrap().unwrap();
        assert!(stored.password_hash.is_some());
        assert!(stored.custodial_key_ciphertext.is_some());
        assert!(!stored.has_legacy_fields());
        assert_eq!(stored.primary_address.as_deref(), Some(LEGACY_ADDRESS));

        // Later sign-ins run entirely off the hash and ciphertext.
        assert!(custody.authenticate("old@x.com", "p").is_ok());
        assert!(matches!(
            custody.authenticate("old@x.com", "wrong"),
            Err(CustodyError::InvalidCredentials)
        ));
    }

    #[test]
    fn legacy_wrong_password_changes_nothing() {
        let (custody, dir) = manager();
        insert_legacy(&dir, "old@x.com", serde_json::json!({ "password": "p" }));
        assert!(matches!(
            custody.authenticate("old@x.com", "q"),
            Err(CustodyError::InvalidCredentials)
        ));
        let raw = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        assert!(!raw.contains("passwordHash"));
    }

    #[test]
    fn record_without_key_requires_migration() {
        let (custody, _dir) = manager();
        custody
            .store()
            .save(&UserRecord {
                id: "nokey@x.com".into(),
                password_hash: Some(password::hash_password("pw").unwrap()),
                primary_address: Some(LEGACY_ADDRESS.into()),
                ..Default::default()
            })
            .unwrap();

        match custody.authenticate("nokey@x.com", "pw") {
            Err(CustodyError::MigrationRequired { address }) => {
                assert_eq!(address.as_deref(), Some(LEGACY_ADDRESS));
            }
            other => panic!("expected MigrationRequired, got {other:?}"),
        }

        let record = custody.store().get("nokey@x.com").unwrap().unwrap();
        assert!(record.custodial_key_ciphertext.is_none());
        assert!(matches!(
            custody.signing_key(&record),
            Err(CustodyError::MigrationRequired { .. })
        ));
    }

    #[test]
    fn legacy_password_without_key_still_persists_hash() {
        let (custody, dir) = manager();
        insert_legacy(&dir, "half@x.com", serde_json::json!({ "password": "p" }));
        assert!(matches!(
            custody.authenticate("half@x.com", "p"),
            Err(CustodyError::MigrationRequired { address: None })
        ));
        let stored = custody.store().get("half@x.com").unwrap().unwrap();
        assert!(stored.password_hash.is_some());
        assert!(stored.legacy_password.is_none());
    }

    #[test]
    fn missing_address_is_backfilled() {
        let (custody, dir) = manager();
        custody.create_account("a@x.com", "pw1").unwrap();
        // Strip the address by rewriting the file directly.
        let path = dir.path().join("users.json");
        let mut map: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let original = map["a@x.com"]["walletAddress"].clone();
        map["a@x.com"].as_object_mut().unwrap().remove("walletAddress");
        std::fs::write(&path, map.to_string()).unwrap();

        custody.authenticate("a@x.com", "pw1").unwrap();
        let stored = custody.store().get("a@x.com").unwrap().unwrap();
        assert_eq!(stored.primary_address.as_deref(), original.as_str());
    }

    #[test]
    fn ciphertext_from_other_secret_is_rejected() {
        let dir = TempDir::new().unwrap();
        manager_with_secret("secret-a", &dir)
            .create_account("a@x.com", "pw1")
            .unwrap();

        let rotated = manager_with_secret("secret-b", &dir);
        let record = rotated.store().get("a@x.com").unwrap().unwrap();
        assert!(matches!(
            rotated.decrypt_custodial_key(&record),
            Err(CustodyError::DecryptionFailed)
        ));
        assert!(matches!(
            rotated.authenticate("a@x.com", "pw1"),
            Err(CustodyError::InvalidCredentials)
        ));
    }

    #[test]
    fn signing_key_accepts_unmigrated_legacy_key() {
        let (custody, _dir) = manager();
        let record = UserRecord {
            id: "old@x.com".into(),
            legacy_private_key: Some(format!("0x{LEGACY_KEY}")),
            ..Default::default()
        };
        let key = custody.signing_key(&record).unwrap();
        assert_eq!(key.address().unwrap(), LEGACY_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn unmigrated_legacy_record_survives_other_signups() {
        let (custody, dir) = manager();
        insert_legacy(
            &dir,
            "old@x.com",
            serde_json::json!({ "password": "p", "privateKey": LEGACY_KEY }),
        );

        custody.create_account("new@x.com", "pw").unwrap();
        custody.authenticate("new@x.com", "pw").unwrap();

        let grant = custody.authenticate("old@x.com", "p").unwrap();
        assert_eq!(grant.address, LEGACY_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn bcrypt_hash_is_verified_and_rehashed() {
        let (custody, dir) = manager();
        let cipher = KeyCipher::derive("test-secret").unwrap();
        insert_legacy(
            &dir,
            "old@x.com",
            serde_json::json!({
                "passwordHash": bcrypt::hash("pw1", 4).unwrap(),
                "encryptedPk": cipher.encrypt(format!("0x{LEGACY_KEY}").as_bytes()).unwrap(),
                "walletAddress": LEGACY_ADDRESS,
            }),
        );

        assert!(matches!(
            custody.authenticate("old@x.com", "wrong"),
            Err(CustodyError::InvalidCredentials)
        ));
        let grant = custody.authenticate("old@x.com", "pw1").unwrap();
        assert_eq!(grant.address, LEGACY_ADDRESS.parse::<Address>().unwrap());

        let stored = custody.store().get("old@x.com").unwrap().unwrap();
        let hash = stored.password_hash.as_deref().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(custody.authenticate("old@x.com", "pw1").is_ok());
    }

    #[test]
    fn scrypt_ciphertext_is_read_and_reencrypted() {
        let (custody, dir) = manager();
        let cipher = KeyCipher::derive("test-secret").unwrap();
        let earlier = cipher
            .encrypt_legacy(format!("0x{LEGACY_KEY}").as_bytes())
            .unwrap();
        insert_legacy(
            &dir,
            "old@x.com",
            serde_json::json!({
                "passwordHash": password::hash_password("pw1").unwrap(),
                "encryptedPk": earlier,
                "walletAddress": LEGACY_ADDRESS,
            }),
        );

        let record = custody.store().get("old@x.com").unwrap().unwrap();
        let key = custody.signing_key(&record).unwrap();
        assert_eq!(key.address().unwrap(), LEGACY_ADDRESS.parse::<Address>().unwrap());

        custody.authenticate("old@x.com", "pw1").unwrap();
        let stored = custody.store().get("old@x.com").unwrap().unwrap();
        let rewritten = stored.custodial_key_ciphertext.as_deref().unwrap();
        assert_ne!(rewritten, earlier);
        assert!(cipher.decrypt(rewritten).is_ok());
    }

    #[test]
    fn unparseable_legacy_key_is_kept() {
        let (custody, dir) = manager();
        insert_legacy(
            &dir,
            "odd@x.com",
            serde_json::json!({ "password": "p", "privateKey": "0xabc" }),
        );

        assert!(matches!(
            custody.authenticate("odd@x.com", "p"),
            Err(CustodyError::MigrationRequired { .. })
        ));

        let stored = custody.store().get("odd@x.com").unwrap().unwrap();
        assert!(stored.password_hash.is_some());
        assert!(stored.legacy_password.is_none());
        assert_eq!(stored.legacy_private_key.as_deref(), Some("0xabc"));
        assert!(stored.custodial_key_ciphertext.is_none());
    }

    #[test]
    fn session_for_deleted_account_is_unauthorized() {
        let (custody, _dir) = manager();
        let token = custody.issue_session("ghost@x.com", None).unwrap();
        let claims = custody.verify_session(&token).unwrap();
        assert!(matches!(
            custody.account_for_session(&claims),
            Err(CustodyError::Unauthorized)
        ));
    }
}
