// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-4337 v0.6 user operation and its hash.

use alloy::{
    primitives::{bytes, keccak256, Address, Bytes, B256, U256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

/// Well-formed signature used while the paymaster and bundler simulate the
/// operation. Recovers to a throwaway address, so validation runs its full
/// gas path without passing.
pub fn dummy_signature() -> Bytes {
    bytes!(
        "fffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
    )
}

/// Unpacked v0.6 user operation, in the JSON shape bundlers expect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`.
    ///
    /// The signature field is not part of the hash.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode_params();

        keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode_params())
    }

    /// Sign the operation hash as an EIP-191 personal message and attach it.
    pub fn sign(
        &mut self,
        signer: &PrivateKeySigner,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<B256, alloy::signers::Error> {
        let hash = self.hash(entry_point, chain_id);
        let signature = signer.sign_message_sync(hash.as_slice())?;
        self.signature = Bytes::from(signature.as_bytes().to_vec());
        Ok(hash)
    }
}
