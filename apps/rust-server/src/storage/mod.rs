// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Account Record Storage
//!
//! Durable mapping from account identifier to [`UserRecord`]. Two backends
//! implement [`UserStore`] and one is chosen at startup:
//!
//! | Backend | Selected when | Layout |
//! |---------|---------------|--------|
//! | [`RedbUserStore`] | `DATABASE_PATH` is set | single redb file, `users` table |
//! | [`JsonFileUserStore`] | otherwise | `users.json` under `DATA_DIR` |
//!
//! ## Write Semantics
//!
//! - `save` is an upsert. A `None` address in the incoming record never
//!   clears an address that is already stored.
//! - Legacy plaintext fields (`password`, `privateKey`) round-trip unchanged
//!   until they are superseded. Writing a `passwordHash` drops `password`;
//!   `privateKey` is dropped only by the caller that encrypted it, or when a
//!   ciphertext is written with `set_field`. A record no write touches is
//!   stored back exactly as it was read.
//! - `set_field_if_absent` is the only way the address backfills run; it
//!   checks and writes under the backend's own lock or write transaction.

pub mod file_store;
pub mod redb_store;

use serde::{Deserialize, Serialize};

pub use file_store::JsonFileUserStore;
pub use redb_store::RedbUserStore;

/// A persisted account.
///
/// On-disk field names are kept stable so files written by earlier
/// deployments load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    /// Account identifier. Stored as the map / table key, not in the value.
    #[serde(skip)]
    pub id: String,

    /// Argon2id PHC string.
    #[serde(rename = "passwordHash", skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// `b64(nonce).b64(ciphertext).b64(tag)` of the custodial key.
    #[serde(
        rename = "encryptedPk",
        alias = "custodialKeyCiphertext",
        skip_serializing_if = "Option::is_none"
    )]
    pub custodial_key_ciphertext: Option<String>,

    /// Externally owned account derived from the custodial key.
    #[serde(
        rename = "walletAddress",
        alias = "primaryAddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_address: Option<String>,

    /// Counterfactual smart-account address, cached after first derivation.
    #[serde(rename = "smartAccountAddress", skip_serializing_if = "Option::is_none")]
    pub smart_account_address: Option<String>,

    /// Legacy plaintext password, kept until a hash replaces it.
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    pub legacy_password: Option<String>,

    /// Legacy plaintext key, hex with or without `0x`. Kept until it has
    /// been encrypted.
    #[serde(rename = "privateKey", skip_serializing_if = "Option::is_none")]
    pub legacy_private_key: Option<String>,
}

impl UserRecord {
    /// Whether the record still carries any plaintext secret.
    pub fn has_legacy_fields(&self) -> bool {
        self.legacy_password.is_some() || self.legacy_private_key.is_some()
    }

    /// Combine an incoming record with the stored one for an upsert.
    ///
    /// Addresses are coalesced so a save built from a stale read cannot
    /// erase a value a concurrent request has cached. A legacy password is
    /// dropped once a hash is present; a legacy key survives unless the
    /// incoming record has cleared it and carries a ciphertext instead.
    pub(crate) fn merged_over(&self, existing: Option<&UserRecord>) -> UserRecord {
        let mut merged = self.clone();
        if let Some(existing) = existing {
            if merged.smart_account_address.is_none() {
                merged.smart_account_address = existing.smart_account_address.clone();
            }
            if merged.primary_address.is_none() {
                merged.primary_address = existing.primary_address.clone();
            }
            if merged.legacy_password.is_none() {
                merged.legacy_password = existing.legacy_password.clone();
            }
            if merged.legacy_private_key.is_none() && merged.custodial_key_ciphertext.is_none() {
                merged.legacy_private_key = existing.legacy_private_key.clone();
            }
        }
        if merged.password_hash.is_some() {
            merged.legacy_password = None;
        }
        merged
    }
}

/// A single updatable field of [`UserRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    PasswordHash,
    CustodialKeyCiphertext,
    PrimaryAddress,
    SmartAccountAddress,
}

impl RecordField {
    fn slot<'a>(&self, record: &'a mut UserRecord) -> &'a mut Option<String> {
        match self {
            RecordField::PasswordHash => &mut record.password_hash,
            RecordField::CustodialKeyCiphertext => &mut record.custodial_key_ciphertext,
            RecordField::PrimaryAddress => &mut record.primary_address,
            RecordField::SmartAccountAddress => &mut record.smart_account_address,
        }
    }

    /// Write `value` into the record. Returns `false` when `only_if_absent`
    /// is set and the slot already holds a value.
    pub(crate) fn apply(&self, record: &mut UserRecord, value: &str, only_if_absent: bool) -> bool {
        let slot = self.slot(record);
        if only_if_absent && slot.is_some() {
            return false;
        }
        *slot = Some(value.to_string());
        match self {
            RecordField::PasswordHash => record.legacy_password = None,
            RecordField::CustodialKeyCiphertext => record.legacy_private_key = None,
            _ => {}
        }
        true
    }
}

impl std::fmt::Display for RecordField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordField::PasswordHash => "passwordHash",
            RecordField::CustodialKeyCiphertext => "encryptedPk",
            RecordField::PrimaryAddress => "walletAddress",
            RecordField::SmartAccountAddress => "smartAccountAddress",
        };
        f.write_str(name)
    }
}

/// Storage backend errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("store lock poisoned")]
    Poisoned,
}

macro_rules! redb_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(e: $ty) -> Self {
                    StorageError::Database(redb::Error::from(e))
                }
            }
        )*
    };
}

redb_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Narrow persistence contract used by the custody and execution layers.
pub trait UserStore: Send + Sync {
    /// Load a record by account id.
    fn get(&self, id: &str) -> StorageResult<Option<UserRecord>>;

    /// Insert a record that must not exist yet.
    fn create(&self, record: &UserRecord) -> StorageResult<()>;

    /// Upsert keyed by `record.id`. See the module docs for merge rules.
    fn save(&self, record: &UserRecord) -> StorageResult<()>;

    /// Overwrite a single field.
    fn set_field(&self, id: &str, field: RecordField, value: &str) -> StorageResult<()>;

    /// Write a single field only if it is currently null.
    ///
    /// Returns `true` when the value was written.
    fn set_field_if_absent(&self, id: &str, field: RecordField, value: &str) -> StorageResult<bool>;

    /// Cheap liveness check for `/health`.
    fn health_check(&self) -> StorageResult<()>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_fields_round_trip_until_superseded() {
        let json = r#"{"password":"pw","privateKey":"abcd","walletAddress":"0x1"}"#;
        let record: UserRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.legacy_password.as_deref(), Some("pw"));
        assert_eq!(record.legacy_private_key.as_deref(), Some("abcd"));
        assert!(record.has_legacy_fields());

        let written = serde_json::to_value(&record).unwrap();
        assert_eq!(written["password"], "pw");
        assert_eq!(written["privateKey"], "abcd");
        assert_eq!(written["walletAddress"], "0x1");

        let clean = serde_json::to_value(UserRecord::default()).unwrap();
        assert_eq!(clean, serde_json::json!({}));
    }

    #[test]
    fn merge_keeps_unmigrated_legacy_key() {
        let existing = UserRecord {
            id: "a".into(),
            legacy_password: Some("p".into()),
            legacy_private_key: Some("0xabc".into()),
            ..Default::default()
        };
        let incoming = UserRecord {
            id: "a".into(),
            password_hash: Some("hash".into()),
            ..Default::default()
        };

        let merged = incoming.merged_over(Some(&existing));
        assert!(merged.legacy_password.is_none());
        assert_eq!(merged.legacy_private_key.as_deref(), Some("0xabc"));

        let encrypted = UserRecord {
            custodial_key_ciphertext: Some("ct".into()),
            ..incoming
        };
        assert!(encrypted.merged_over(Some(&existing)).legacy_private_key.is_none());
    }

    #[test]
    fn accepts_descriptive_field_aliases() {
        let json = r#"{"passwordHash":"h","custodialKeyCiphertext":"c","primaryAddress":"0x2"}"#;
        let record: UserRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.custodial_key_ciphertext.as_deref(), Some("c"));
        assert_eq!(record.primary_address.as_deref(), Some("0x2"));
    }

    #[test]
    fn merge_keeps_stored_smart_account() {
        let existing = UserRecord {
            id: "a".into(),
            smart_account_address: Some("0xaa".into()),
            primary_address: Some("0x01".into()),
            ..Default::default()
        };
        let incoming = UserRecord {
            id: "a".into(),
            password_hash: Some("new".into()),
            legacy_password: Some("old".into()),
            ..Default::default()
        };

        let merged = incoming.merged_over(Some(&existing));
        assert_eq!(merged.smart_account_address.as_deref(), Some("0xaa"));
        assert_eq!(merged.primary_address.as_deref(), Some("0x01"));
        assert_eq!(merged.password_hash.as_deref(), Some("new"));
        assert!(merged.legacy_password.is_none());
    }

    #[test]
    fn apply_if_absent_does_not_overwrite() {
        let mut record = UserRecord::default();
        assert!(RecordField::SmartAccountAddress.apply(&mut record, "0x1", true));
        assert!(!RecordField::SmartAccountAddress.apply(&mut record, "0x2", true));
        assert_eq!(record.smart_account_address.as_deref(), Some("0x1"));

        assert!(RecordField::SmartAccountAddress.apply(&mut record, "0x3", false));
        assert_eq!(record.smart_account_address.as_deref(), Some("0x3"));
    }

    #[test]
    fn apply_drops_only_the_superseded_legacy_field() {
        let mut record = UserRecord {
            legacy_password: Some("p".into()),
            legacy_private_key: Some("0xabc".into()),
            ..Default::default()
        };
        RecordField::SmartAccountAddress.apply(&mut record, "0x1", false);
        assert!(record.legacy_password.is_some());
        assert!(record.legacy_private_key.is_some());

        RecordField::PasswordHash.apply(&mut record, "hash", false);
        assert!(record.legacy_password.is_none());
        assert!(record.legacy_private_key.is_some());

        RecordField::CustodialKeyCiphertext.apply(&mut record, "ct", false);
        assert!(record.legacy_private_key.is_none());
    }
}
