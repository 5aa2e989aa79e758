// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric encryption of custodial keys at rest.
//!
//! ## Key Derivation
//!
//! The AES-256-GCM key is Argon2id(server secret, fixed application salt),
//! computed once at startup. Parameters are pinned so a dependency bump
//! cannot silently change the derived key. Rotating the server secret makes
//! every stored ciphertext undecryptable.
//!
//! Ciphertexts written by the earlier service used
//! scrypt(secret, same salt, N=2^14, r=8, p=1). That key is derived too and
//! is only ever used to decrypt, so such payloads can be re-encrypted.
//!
//! ## Payload Format
//!
//! `base64(nonce) "." base64(ciphertext) "." base64(tag)` with a fresh
//! 96-bit random nonce per encryption and a 128-bit tag.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64ct::{Base64, Encoding};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

/// Fixed application salt for deriving the encryption key from the secret.
const KDF_SALT: &[u8] = b"waas-salt";

/// scrypt cost parameters of the earlier service (log2 N, r, p).
const LEGACY_SCRYPT_LOG_N: u8 = 14;
const LEGACY_SCRYPT_R: u32 = 8;
const LEGACY_SCRYPT_P: u32 = 1;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encryption and decryption failures. Deliberately coarse.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("malformed ciphertext payload")]
    Malformed,

    #[error("encryption failed")]
    Encrypt,

    #[error("authentication tag mismatch")]
    Decrypt,
}

/// AES-256-GCM cipher keyed from the server secret.
pub struct KeyCipher {
    key: Zeroizing<[u8; 32]>,
    legacy_key: Zeroizing<[u8; 32]>,
}

impl KeyCipher {
    /// Derive the cipher keys from the server secret.
    pub fn derive(secret: &str) -> Result<Self, CipherError> {
        // These match `argon2::Params::DEFAULT` in argon2 0.5.x.
        let params = Params::new(19 * 1024, 2, 1, Some(32))
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(secret.as_bytes(), KDF_SALT, key.as_mut_slice())
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            key,
            legacy_key: derive_legacy_key(secret)?,
        })
    }

    /// Encrypt `plaintext` into the three-part text payload.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        seal(&self.key, plaintext)
    }

    /// Decrypt a payload produced by [`KeyCipher::encrypt`].
    pub fn decrypt(&self, payload: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        open(&self.key, payload)
    }

    /// Decrypt a payload written under the earlier scrypt-derived key.
    pub fn decrypt_legacy(&self, payload: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        open(&self.legacy_key, payload)
    }

    #[cfg(test)]
    pub(crate) fn encrypt_legacy(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        seal(&self.legacy_key, plaintext)
    }
}

fn derive_legacy_key(secret: &str) -> Result<Zeroizing<[u8; 32]>, CipherError> {
    let params = scrypt::Params::new(LEGACY_SCRYPT_LOG_N, LEGACY_SCRYPT_R, LEGACY_SCRYPT_P, 32)
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    let mut key = Zeroizing::new([0u8; 32]);
    scrypt::scrypt(secret.as_bytes(), KDF_SALT, &params, key.as_mut_slice())
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

fn cipher(key: &[u8; 32]) -> Result<Aes256Gcm, CipherError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::Encrypt)
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<String, CipherError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::Encrypt)?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(format!(
        "{}.{}.{}",
        Base64::encode_string(&nonce),
        Base64::encode_string(ciphertext),
        Base64::encode_string(tag)
    ))
}

fn open(key: &[u8; 32], payload: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let mut parts = payload.trim().split('.');
    let (Some(nonce), Some(ciphertext), Some(tag), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CipherError::Malformed);
    };

    let nonce = Base64::decode_vec(nonce).map_err(|_| CipherError::Malformed)?;
    let mut sealed = Base64::decode_vec(ciphertext).map_err(|_| CipherError::Malformed)?;
    let tag = Base64::decode_vec(tag).map_err(|_| CipherError::Malformed)?;
    if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(CipherError::Malformed);
    }
    sealed.extend_from_slice(&tag);

    let plaintext = cipher(key)?
        .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
        .map_err(|_| CipherError::Decrypt)?;
    Ok(Zeroizing::new(plaintext))
}

impl std::fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyCipher(<redacted>)")
    }
}
