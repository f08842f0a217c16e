// src/operation.rs
//! Canonical in-memory UserOperation forms for each EntryPoint version.
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::PaymasterError;
use crate::version::EntryPointVersion;

/// User Operation as defined by EIP-4337 v0.6
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationV6 {
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

/// Packed User Operation as consumed by EntryPoint v0.7
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationV7 {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    /// verificationGasLimit (high 16 bytes) ∥ callGasLimit (low 16 bytes)
    pub account_gas_limits: H256,
    pub pre_verification_gas: U256,
    /// maxPriorityFeePerGas (high 16 bytes) ∥ maxFeePerGas (low 16 bytes)
    pub gas_fees: H256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationVariant {
    V6(OperationV6),
    V7(OperationV7),
}

/// Gas and fee values in decomposed form, whatever the wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasFields {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl GasFields {
    pub fn fees_are_zero(&self) -> bool {
        self.max_fee_per_gas.is_zero() && self.max_priority_fee_per_gas.is_zero()
    }
}

/// Packs two 128-bit values into one word, `high` in the upper half.
pub fn pack_u128_pair(high: U256, low: U256, field: &str) -> Result<H256, PaymasterError> {
    if high.bits() > 128 || low.bits() > 128 {
        return Err(PaymasterError::InvalidUserOperation(format!(
            "{field} components must fit in 128 bits"
        )));
    }
    let mut high_bytes = [0u8; 32];
    let mut low_bytes = [0u8; 32];
    high.to_big_endian(&mut high_bytes);
    low.to_big_endian(&mut low_bytes);

    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high_bytes[16..]);
    word[16..].copy_from_slice(&low_bytes[16..]);
    Ok(H256(word))
}

/// Inverse of [`pack_u128_pair`]: returns `(high, low)`.
pub fn unpack_u128_pair(word: H256) -> (U256, U256) {
    (
        U256::from_big_endian(&word.as_bytes()[..16]),
        U256::from_big_endian(&word.as_bytes()[16..]),
    )
}

pub fn word_from_u256(value: U256) -> H256 {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    H256(word)
}

impl OperationVariant {
    pub fn version(&self) -> EntryPointVersion {
        match self {
            OperationVariant::V6(_) => EntryPointVersion::V06,
            OperationVariant::V7(_) => EntryPointVersion::V07,
        }
    }

    pub fn sender(&self) -> Address {
        match self {
            OperationVariant::V6(op) => op.sender,
            OperationVariant::V7(op) => op.sender,
        }
    }

    pub fn nonce(&self) -> U256 {
        match self {
            OperationVariant::V6(op) => op.nonce,
            OperationVariant::V7(op) => op.nonce,
        }
    }

    pub fn init_code(&self) -> &Bytes {
        match self {
            OperationVariant::V6(op) => &op.init_code,
            OperationVariant::V7(op) => &op.init_code,
        }
    }

    pub fn call_data(&self) -> &Bytes {
        match self {
            OperationVariant::V6(op) => &op.call_data,
            OperationVariant::V7(op) => &op.call_data,
        }
    }

    pub fn paymaster_and_data(&self) -> &Bytes {
        match self {
            OperationVariant::V6(op) => &op.paymaster_and_data,
            OperationVariant::V7(op) => &op.paymaster_and_data,
        }
    }

    pub fn signature(&self) -> &Bytes {
        match self {
            OperationVariant::V6(op) => &op.signature,
            OperationVariant::V7(op) => &op.signature,
        }
    }

    pub fn gas_fields(&self) -> GasFields {
        match self {
            OperationVariant::V6(op) => GasFields {
                call_gas_limit: op.call_gas_limit,
                verification_gas_limit: op.verification_gas_limit,
                pre_verification_gas: op.pre_verification_gas,
                max_fee_per_gas: op.max_fee_per_gas,
                max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            },
            OperationVariant::V7(op) => {
                let (verification_gas_limit, call_gas_limit) =
                    unpack_u128_pair(op.account_gas_limits);
                let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_u128_pair(op.gas_fees);
                GasFields {
                    call_gas_limit,
                    verification_gas_limit,
                    pre_verification_gas: op.pre_verification_gas,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                }
            }
        }
    }

    pub fn with_paymaster_and_data(mut self, paymaster_and_data: Bytes) -> Self {
        match &mut self {
            OperationVariant::V6(op) => op.paymaster_and_data = paymaster_and_data,
            OperationVariant::V7(op) => op.paymaster_and_data = paymaster_and_data,
        }
        self
    }

    /// Zeroes both fee fields and strips any paymaster data.
    pub fn into_direct_payment(self) -> Self {
        match self {
            OperationVariant::V6(mut op) => {
                op.max_fee_per_gas = U256::zero();
                op.max_priority_fee_per_gas = U256::zero();
                op.paymaster_and_data = Bytes::default();
                OperationVariant::V6(op)
            }
            OperationVariant::V7(mut op) => {
                op.gas_fees = H256::zero();
                op.paymaster_and_data = Bytes::default();
                OperationVariant::V7(op)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_v7() -> OperationV7 {
        OperationV7 {
            sender: Address::repeat_byte(0x11),
            nonce: U256::from(3),
            init_code: Bytes::default(),
            call_data: Bytes::from(vec![0xb6, 0x1d, 0x27, 0xf6]),
            account_gas_limits: pack_u128_pair(U256::from(0x186a0), U256::from(0x5208), "x")
                .unwrap(),
            pre_verification_gas: U256::from(0xb61c),
            gas_fees: pack_u128_pair(U256::from(0x3b9aca00u64), U256::from(0x59682f10u64), "x")
                .unwrap(),
            paymaster_and_data: Bytes::from(vec![0xaa; 4]),
            signature: Bytes::from(vec![0x01]),
        }
    }

    #[test]
    fn should_pack_high_and_low_halves() {
        let word = pack_u128_pair(U256::from(0x186a0), U256::from(0x5208), "accountGasLimits")
            .unwrap();
        assert_eq!(
            hex::encode(word.as_bytes()),
            "000000000000000000000000000186a000000000000000000000000000005208"
        );
        assert_eq!(
            unpack_u128_pair(word),
            (U256::from(0x186a0), U256::from(0x5208))
        );
    }

    #[test]
    fn should_reject_values_wider_than_128_bits() {
        let wide = U256::from_big_endian(&[0x01; 17]);
        let err = pack_u128_pair(wide, U256::zero(), "gasFees").unwrap_err();
        assert!(matches!(err, PaymasterError::InvalidUserOperation(_)));
        assert!(err.to_string().contains("gasFees"));
    }

    #[test]
    fn should_decode_packed_gas_fields() {
        let gas = OperationVariant::V7(packed_v7()).gas_fields();
        assert_eq!(gas.verification_gas_limit, U256::from(0x186a0));
        assert_eq!(gas.call_gas_limit, U256::from(0x5208));
        assert_eq!(gas.max_priority_fee_per_gas, U256::from(0x3b9aca00u64));
        assert_eq!(gas.max_fee_per_gas, U256::from(0x59682f10u64));
        assert_eq!(gas.pre_verification_gas, U256::from(0xb61c));
        assert!(!gas.fees_are_zero());
    }

    #[test]
    fn should_zero_fees_for_direct_payment() {
        let op = OperationVariant::V7(packed_v7()).into_direct_payment();
        assert!(op.gas_fields().fees_are_zero());
        assert!(op.paymaster_and_data().is_empty());
        assert_eq!(op.gas_fields().call_gas_limit, U256::from(0x5208));
    }

    #[test]
    fn should_serialize_packed_words_at_full_width() {
        let json = serde_json::to_value(packed_v7()).unwrap();
        assert_eq!(
            json["accountGasLimits"],
            "0x000000000000000000000000000186a000000000000000000000000000005208"
        );
        assert_eq!(json["callData"], "0xb61d27f6");
        assert!(json.get("callGasLimit").is_none());
    }
}
