// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing (Argon2id, PHC strings) and legacy plaintext comparison.
//!
//! bcrypt hashes (`$2a$`, `$2b$`, `$2y$`) left by the earlier service still
//! verify; callers rehash them with Argon2id after a successful check.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use k256::elliptic_curve::rand_core::OsRng;
use sha2::{Digest, Sha256};

/// Hash a password into a self-describing PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Whether `stored_hash` is a bcrypt hash that should be replaced.
pub fn is_legacy_hash(stored_hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| stored_hash.starts_with(prefix))
}

/// Verify a password against a stored Argon2 PHC string or bcrypt hash.
///
/// Unparseable hashes never verify.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    if is_legacy_hash(stored_hash) {
        return bcrypt::verify(password, stored_hash).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored bcrypt hash is malformed");
            false
        });
    }

    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::warn!("stored password hash is not a recognised PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Compare a candidate against a legacy plaintext password.
///
/// Both sides are digested first so the comparison length is fixed, then
/// compared without early exit.
pub fn legacy_password_matches(candidate: &str, stored: &str) -> bool {
    let a = Sha256::digest(candidate.as_bytes());
    let b = Sha256::digest(stored.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
