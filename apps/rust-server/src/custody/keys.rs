// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! secp256k1 custodial key material.

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use zeroize::Zeroizing;

/// Errors raised while parsing or using key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid hex encoding")]
    InvalidHex,

    #[error("expected 32 key bytes, got {0}")]
    InvalidLength(usize),

    #[error("key is not a valid secp256k1 scalar")]
    InvalidScalar,
}

/// A decrypted custodial private key.
///
/// The bytes are wiped on drop and never printed.
pub struct CustodialKey {
    bytes: Zeroizing<[u8; 32]>,
}

impl CustodialKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(&signing_key.to_bytes());
        Self { bytes }
    }

    /// Parse a hex key, with or without a `0x` prefix.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let trimmed = hex.trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let decoded = Zeroizing::new(alloy::hex::decode(stripped).map_err(|_| KeyError::InvalidHex)?);
        Self::from_slice(&decoded)
    }

    /// Build from raw bytes, rejecting zero and out-of-range scalars.
    pub fn from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != 32 {
            return Err(KeyError::InvalidLength(slice.len()));
        }
        SigningKey::from_slice(slice).map_err(|_| KeyError::InvalidScalar)?;

        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// `0x`-prefixed lowercase hex. This is the plaintext that gets encrypted.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", alloy::hex::encode(self.bytes.as_slice())))
    }

    /// Ethereum address of the key.
    pub fn address(&self) -> Result<Address, KeyError> {
        Ok(self.signer()?.address())
    }

    /// Local signer for transactions and user operations.
    pub fn signer(&self) -> Result<PrivateKeySigner, KeyError> {
        PrivateKeySigner::from_slice(self.bytes.as_slice()).map_err(|_| KeyError::InvalidScalar)
    }
}

impl std::fmt::Debug for CustodialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustodialKey(<redacted>)")
    }
}
