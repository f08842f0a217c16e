// src/hashing.rs
//! The two hashes the paymaster depends on.
//!
//! * The operation hash is what the EntryPoint computes in `getUserOpHash`;
//!   it is returned to callers and used as the cache fingerprint.
//! * The paymaster signing hash is what the paymaster contract recomputes in
//!   `validatePaymasterUserOp` before recovering the signer.
use ethers::abi::{encode, Token};
use ethers::types::{H256, U256};
use ethers::utils::keccak256;

use crate::operation::OperationVariant;
use crate::version::VersionPolicy;

fn hash_token(data: &[u8]) -> Token {
    Token::FixedBytes(keccak256(data).to_vec())
}

fn word(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

/// keccak256 of the ABI-encoded operation, signature excluded.
pub fn struct_hash(op: &OperationVariant) -> H256 {
    let tokens = match op {
        OperationVariant::V6(op) => vec![
            Token::Address(op.sender),
            Token::Uint(op.nonce),
            hash_token(&op.init_code),
            hash_token(&op.call_data),
            Token::Uint(op.call_gas_limit),
            Token::Uint(op.verification_gas_limit),
            Token::Uint(op.pre_verification_gas),
            Token::Uint(op.max_fee_per_gas),
            Token::Uint(op.max_priority_fee_per_gas),
            hash_token(&op.paymaster_and_data),
        ],
        OperationVariant::V7(op) => vec![
            Token::Address(op.sender),
            Token::Uint(op.nonce),
            hash_token(&op.init_code),
            hash_token(&op.call_data),
            Token::FixedBytes(op.account_gas_limits.as_bytes().to_vec()),
            Token::Uint(op.pre_verification_gas),
            Token::FixedBytes(op.gas_fees.as_bytes().to_vec()),
            hash_token(&op.paymaster_and_data),
        ],
    };
    H256::from(keccak256(encode(&tokens)))
}

/// `keccak256(abi.encode(structHash, entryPoint, chainId))`
pub fn operation_hash(op: &OperationVariant, policy: &VersionPolicy) -> H256 {
    let encoded = encode(&[
        Token::FixedBytes(struct_hash(op).as_bytes().to_vec()),
        Token::Address(policy.entry_point),
        Token::Uint(U256::from(policy.chain_id)),
    ]);
    H256::from(keccak256(encoded))
}

/// Hash the paymaster signs. `prefix` is `paymaster ∥ validUntil ∥ validAfter`;
/// gas values are always taken in decomposed form so both layouts agree.
pub fn paymaster_signing_hash(op: &OperationVariant, prefix: &[u8], chain_id: u64) -> H256 {
    let gas = op.gas_fields();

    let mut data = Vec::with_capacity(20 + 32 * 9);
    data.extend_from_slice(op.sender().as_bytes());
    data.extend_from_slice(&word(op.nonce()));
    data.extend_from_slice(&word(gas.call_gas_limit));
    data.extend_from_slice(&word(gas.verification_gas_limit));
    data.extend_from_slice(&word(gas.pre_verification_gas));
    data.extend_from_slice(&word(gas.max_fee_per_gas));
    data.extend_from_slice(&word(gas.max_priority_fee_per_gas));
    data.extend_from_slice(&keccak256(op.call_data()));
    data.extend_from_slice(&keccak256(op.init_code()));
    data.extend_from_slice(&keccak256(prefix));
    let inner = keccak256(&data);

    let mut chained = Vec::with_capacity(64);
    chained.extend_from_slice(&inner);
    chained.extend_from_slice(&word(U256::from(chain_id)));
    H256::from(keccak256(&chained))
}
