// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded record database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: account id → serialized [`UserRecord`] (JSON bytes)
//!
//! Read-modify-write operations (`save`, `set_field*`) run inside a single
//! write transaction, which redb serializes, so backfills cannot race.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{RecordField, StorageError, StorageResult, UserRecord, UserStore};

/// Primary table: account id → serialized UserRecord.
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Embedded ACID record store.
pub struct RedbUserStore {
    db: Database,
}

impl RedbUserStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;

        // Pre-create the table so read transactions never hit TableDoesNotExist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn decode(id: &str, bytes: &[u8]) -> StorageResult<UserRecord> {
        let mut record: UserRecord = serde_json::from_slice(bytes)?;
        record.id = id.to_string();
        Ok(record)
    }

    /// Load, modify and store one record inside a single write transaction.
    fn update<T>(
        &self,
        id: &str,
        f: impl FnOnce(Option<UserRecord>) -> StorageResult<(T, Option<UserRecord>)>,
    ) -> StorageResult<T> {
        let write_txn = self.db.begin_write()?;
        let out = {
            let mut table = write_txn.open_table(USERS)?;
            let existing = {
                match table.get(id)? {
                    Some(guard) => Some(Self::decode(id, guard.value())?),
                    None => None,
                }
            };
            let (out, next) = f(existing)?;
            if let Some(next) = next {
                let json = serde_json::to_vec(&next)?;
                table.insert(id, json.as_slice())?;
            }
            out
        };
        write_txn.commit()?;
        Ok(out)
    }
}

impl UserStore for RedbUserStore {
    fn get(&self, id: &str) -> StorageResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(Self::decode(id, value.value())?)),
            None => Ok(None),
        }
    }

    fn create(&self, record: &UserRecord) -> StorageResult<()> {
        self.update(&record.id, |existing| {
            if existing.is_some() {
                return Err(StorageError::AlreadyExists(record.id.clone()));
            }
            Ok(((), Some(record.merged_over(None))))
        })
    }

    fn save(&self, record: &UserRecord) -> StorageResult<()> {
        self.update(&record.id, |existing| {
            Ok(((), Some(record.merged_over(existing.as_ref()))))
        })
    }

    fn set_field(&self, id: &str, field: RecordField, value: &str) -> StorageResult<()> {
        self.update(id, |existing| {
            let mut record = existing.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            field.apply(&mut record, value, false);
            Ok(((), Some(record)))
        })
    }

    fn set_field_if_absent(&self, id: &str, field: RecordField, value: &str) -> StorageResult<bool> {
        self.update(id, |existing| {
            let mut record = existing.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            if field.apply(&mut record, value, true) {
                Ok((true, Some(record)))
            } else {
                Ok((false, None))
            }
        })
    }

    fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redb"
    }
}
