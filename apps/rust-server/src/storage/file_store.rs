// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON file backend.
//!
//! All records live in one `users.json` object keyed by account id. Every
//! mutation is a read-modify-write of the whole file under a process-local
//! mutex, finished by an atomic rename so a crash never leaves a torn file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{RecordField, StorageError, StorageResult, UserRecord, UserStore};

/// File name of the record map inside the data directory.
pub const USERS_FILE: &str = "users.json";

type UserMap = BTreeMap<String, UserRecord>;

/// Single-file JSON record store.
#[derive(Debug)]
pub struct JsonFileUserStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileUserStore {
    /// Open the store in `dir`, creating the directory and an empty map if needed.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let store = Self {
            path: dir.join(USERS_FILE),
            lock: Mutex::new(()),
        };
        if !store.path.exists() {
            store.write_map(&UserMap::new())?;
        }
        Ok(store)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> StorageResult<UserMap> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UserMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(UserMap::new());
        }

        let mut map: UserMap = serde_json::from_slice(&raw)?;
        for (id, record) in map.iter_mut() {
            record.id = id.clone();
        }
        Ok(map)
    }

    /// Write the map via temp file + rename.
    fn write_map(&self, map: &UserMap) -> StorageResult<()> {
        let temp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, map)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Run `f` over the loaded map while holding the lock. The map is
    /// written back only when `f` reports a change.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut UserMap) -> StorageResult<(T, bool)>,
    ) -> StorageResult<T> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut map = self.read_map()?;
        let (out, dirty) = f(&mut map)?;
        if dirty {
            self.write_map(&map)?;
        }
        Ok(out)
    }
}

impl UserStore for JsonFileUserStore {
    fn get(&self, id: &str) -> StorageResult<Option<UserRecord>> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.read_map()?.remove(id))
    }

    fn create(&self, record: &UserRecord) -> StorageResult<()> {
        self.mutate(|map| {
            if map.contains_key(&record.id) {
                return Err(StorageError::AlreadyExists(record.id.clone()));
            }
            map.insert(record.id.clone(), record.merged_over(None));
            Ok(((), true))
        })
    }

    fn save(&self, record: &UserRecord) -> StorageResult<()> {
        self.mutate(|map| {
            let merged = record.merged_over(map.get(&record.id));
            map.insert(record.id.clone(), merged);
            Ok(((), true))
        })
    }

    fn set_field(&self, id: &str, field: RecordField, value: &str) -> StorageResult<()> {
        self.mutate(|map| {
            let record = map
                .get_mut(id)
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            field.apply(record, value, false);
            Ok(((), true))
        })
    }

    fn set_field_if_absent(&self, id: &str, field: RecordField, value: &str) -> StorageResult<bool> {
        self.mutate(|map| {
            let record = map
                .get_mut(id)
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            let written = field.apply(record, value, true);
            Ok((written, written))
        })
    }

    fn health_check(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.read_map().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "json-file"
    }
}
