// src/normalizer.rs
//! Turns a caller-supplied JSON operation, in either wire layout, into the
//! [`OperationVariant`] required by the resolved [`VersionPolicy`].
use ethers::types::Bytes;
use serde_json::Value;

use crate::error::PaymasterError;
use crate::operation::{
    pack_u128_pair, unpack_u128_pair, word_from_u256, GasFields, OperationV6, OperationV7,
    OperationVariant,
};
use crate::types::RawUserOperation;
use crate::version::{EntryPointVersion, VersionPolicy};

/// Decodes the JSON value into the permissive raw form. Field shape errors
/// (bad hex, wrong address width) surface here.
pub fn parse(value: &Value) -> Result<RawUserOperation, PaymasterError> {
    if !value.is_object() {
        return Err(PaymasterError::InvalidUserOperation(
            "userOperation must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value.clone())
        .map_err(|e| PaymasterError::InvalidUserOperation(format!("malformed field: {e}")))
}

/// Checks that every field the given EntryPoint version requires is present.
/// Empty bytes (`0x`) count as present.
pub fn validate(raw: &RawUserOperation, version: EntryPointVersion) -> Result<(), PaymasterError> {
    let mut missing = Vec::new();
    if raw.sender.is_none() {
        missing.push("sender");
    }
    if raw.nonce.is_none() {
        missing.push("nonce");
    }
    if version == EntryPointVersion::V06 && raw.init_code.is_none() {
        missing.push("initCode");
    }
    if raw.call_data.is_none() {
        missing.push("callData");
    }
    if version == EntryPointVersion::V06 && raw.paymaster_and_data.is_none() {
        missing.push("paymasterAndData");
    }
    if raw.signature.is_none() {
        missing.push("signature");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PaymasterError::InvalidUserOperation(format!(
            "missing required field(s) for EntryPoint v{version}: {}",
            missing.join(", ")
        )))
    }
}

/// Builds the policy's variant from a validated raw operation. Gas fields the
/// caller did not send are zero.
pub fn build(
    raw: RawUserOperation,
    policy: &VersionPolicy,
) -> Result<OperationVariant, PaymasterError> {
    let gas = decomposed_gas(&raw);
    let init_code = init_code(&raw);
    let missing =
        |field: &str| PaymasterError::InvalidUserOperation(format!("missing required field: {field}"));

    let sender = raw.sender.ok_or_else(|| missing("sender"))?;
    let nonce = raw.nonce.ok_or_else(|| missing("nonce"))?;
    let call_data = raw.call_data.ok_or_else(|| missing("callData"))?;
    let signature = raw.signature.ok_or_else(|| missing("signature"))?;
    let paymaster_and_data = raw.paymaster_and_data.unwrap_or_default();

    match policy.version {
        EntryPointVersion::V06 => Ok(OperationVariant::V6(OperationV6 {
            sender,
            nonce,
            init_code,
            call_data,
            call_gas_limit: gas.call_gas_limit,
            verification_gas_limit: gas.verification_gas_limit,
            pre_verification_gas: gas.pre_verification_gas,
            max_fee_per_gas: gas.max_fee_per_gas,
            max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
            paymaster_and_data,
            signature,
        })),
        EntryPointVersion::V07 => {
            let account_gas_limits = match raw.account_gas_limits {
                Some(word) => word_from_u256(word),
                None => pack_u128_pair(
                    gas.verification_gas_limit,
                    gas.call_gas_limit,
                    "accountGasLimits",
                )?,
            };
            let gas_fees = match raw.gas_fees {
                Some(word) => word_from_u256(word),
                None => pack_u128_pair(
                    gas.max_priority_fee_per_gas,
                    gas.max_fee_per_gas,
                    "gasFees",
                )?,
            };
            Ok(OperationVariant::V7(OperationV7 {
                sender,
                nonce,
                init_code,
                call_data,
                account_gas_limits,
                pre_verification_gas: gas.pre_verification_gas,
                gas_fees,
                paymaster_and_data,
                signature,
            }))
        }
    }
}

/// parse → validate → build in one call.
#[cfg(test)]
pub fn normalize(value: &Value, policy: &VersionPolicy) -> Result<OperationVariant, PaymasterError> {
    let raw = parse(value)?;
    validate(&raw, policy.version)?;
    build(raw, policy)
}

fn decomposed_gas(raw: &RawUserOperation) -> GasFields {
    let (verification_gas_limit, call_gas_limit) = match raw.account_gas_limits {
        Some(word) => unpack_u128_pair(word_from_u256(word)),
        None => (
            raw.verification_gas_limit.unwrap_or_default(),
            raw.call_gas_limit.unwrap_or_default(),
        ),
    };
    let (max_priority_fee_per_gas, max_fee_per_gas) = match raw.gas_fees {
        Some(word) => unpack_u128_pair(word_from_u256(word)),
        None => (
            raw.max_priority_fee_per_gas.unwrap_or_default(),
            raw.max_fee_per_gas.unwrap_or_default(),
        ),
    };
    GasFields {
        call_gas_limit,
        verification_gas_limit,
        pre_verification_gas: raw.pre_verification_gas.unwrap_or_default(),
        max_fee_per_gas,
        max_priority_fee_per_gas,
    }
}

/// `initCode` as sent, else `factory ∥ factoryData`, else empty.
fn init_code(raw: &RawUserOperation) -> Bytes {
    if let Some(init_code) = &raw.init_code {
        return init_code.clone();
    }
    match raw.factory {
        Some(factory) => {
            let mut buf = factory.as_bytes().to_vec();
            if let Some(factory_data) = &raw.factory_data {
                buf.extend_from_slice(factory_data);
            }
            Bytes::from(buf)
        }
        None => Bytes::default(),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ethers::types::{Address, H256, U256};
    use serde_json::json;

    use super::*;
    use crate::version::EntryPoints;

    fn policy(version: EntryPointVersion) -> VersionPolicy {
        VersionPolicy::new(version, &EntryPoints::default(), 11155111)
    }

    fn flat_op() -> Value {
        json!({
            "sender": "0x1234567890123456789012345678901234567890",
            "nonce": "0x0",
            "initCode": "0x",
            "callData": "0x",
            "callGasLimit": "0x5208",
            "verificationGasLimit": "0x186a0",
            "preVerificationGas": "0x5208",
            "maxFeePerGas": "0x3b9aca00",
            "maxPriorityFeePerGas": "0x3b9aca00",
            "paymasterAndData": "0x",
            "signature": "0x"
        })
    }

    fn packed_op() -> Value {
        json!({
            "sender": "0x1234567890123456789012345678901234567890",
            "nonce": "0x0",
            "initCode": "0x",
            "callData": "0x",
            "accountGasLimits": "0x000000000000000000000000000186a000000000000000000000000000005208",
            "preVerificationGas": "0x5208",
            "gasFees": "0x0000000000000000000000003b9aca000000000000000000000000003b9aca00",
            "paymasterAndData": "0x",
            "signature": "0x"
        })
    }

    #[test]
    fn should_normalize_flat_operation_for_v06() {
        let op = normalize(&flat_op(), &policy(EntryPointVersion::V06)).unwrap();
        match op {
            OperationVariant::V6(op) => {
                assert_eq!(
                    op.sender,
                    Address::from_str("0x1234567890123456789012345678901234567890").unwrap()
                );
                assert_eq!(op.call_gas_limit, U256::from(0x5208));
                assert_eq!(op.verification_gas_limit, U256::from(0x186a0));
                assert!(op.init_code.is_empty());
                assert!(op.signature.is_empty());
            }
            other => panic!("Expected V6, got {:?}", other),
        }
    }

    #[test]
    fn should_pack_flat_operation_for_v07() {
        let op = normalize(&flat_op(), &policy(EntryPointVersion::V07)).unwrap();
        let packed = normalize(&packed_op(), &policy(EntryPointVersion::V07)).unwrap();
        assert_eq!(op, packed);
    }

    #[test]
    fn should_decompose_packed_operation_for_v06() {
        let op = normalize(&packed_op(), &policy(EntryPointVersion::V06)).unwrap();
        let flat = normalize(&flat_op(), &policy(EntryPointVersion::V06)).unwrap();
        assert_eq!(op, flat);
    }

    #[test]
    fn should_require_v06_fields() {
        let mut value = flat_op();
        value.as_object_mut().unwrap().remove("paymasterAndData");
        value.as_object_mut().unwrap().remove("signature");
        let err = normalize(&value, &policy(EntryPointVersion::V06)).unwrap_err();
        assert!(matches!(err, PaymasterError::InvalidUserOperation(_)));
        let message = err.to_string();
        assert!(message.contains("paymasterAndData"));
        assert!(message.contains("signature"));
    }

    #[test]
    fn should_treat_null_as_absent() {
        let mut value = flat_op();
        value["initCode"] = Value::Null;
        let err = normalize(&value, &policy(EntryPointVersion::V06)).unwrap_err();
        assert!(err.to_string().contains("initCode"));
    }

    #[test]
    fn should_relax_v07_requirements() {
        let value = json!({
            "sender": "0x1234567890123456789012345678901234567890",
            "nonce": "0x1",
            "callData": "0xb61d27f6",
            "signature": "0x01"
        });
        let op = normalize(&value, &policy(EntryPointVersion::V07)).unwrap();
        match op {
            OperationVariant::V7(op) => {
                assert_eq!(op.account_gas_limits, H256::zero());
                assert_eq!(op.gas_fees, H256::zero());
                assert!(op.init_code.is_empty());
                assert!(op.paymaster_and_data.is_empty());
            }
            other => panic!("Expected V7, got {:?}", other),
        }

        let err = normalize(&value, &policy(EntryPointVersion::V06)).unwrap_err();
        assert!(err.to_string().contains("initCode"));
    }

    #[test]
    fn should_build_init_code_from_factory() {
        let value = json!({
            "sender": "0x1234567890123456789012345678901234567890",
            "nonce": "0x1",
            "factory": "0x2222222222222222222222222222222222222222",
            "factoryData": "0xabcdef",
            "callData": "0x",
            "signature": "0x"
        });
        let op = normalize(&value, &policy(EntryPointVersion::V07)).unwrap();
        let mut expected = vec![0x22; 20];
        expected.extend_from_slice(&[0xab, 0xcd, 0xef]);
        assert_eq!(op.init_code().to_vec(), expected);
    }

    #[test]
    fn should_reject_malformed_values() {
        let mut value = flat_op();
        value["nonce"] = json!("not-hex");
        let err = normalize(&value, &policy(EntryPointVersion::V06)).unwrap_err();
        assert!(matches!(err, PaymasterError::InvalidUserOperation(_)));

        let err = normalize(&json!(["not", "an", "object"]), &policy(EntryPointVersion::V06))
            .unwrap_err();
        assert!(matches!(err, PaymasterError::InvalidUserOperation(_)));
    }

    #[test]
    fn should_reject_oversized_gas_when_packing() {
        let mut value = flat_op();
        value["maxFeePerGas"] = json!("0x100000000000000000000000000000000");
        let err = normalize(&value, &policy(EntryPointVersion::V07)).unwrap_err();
        assert!(err.to_string().contains("gasFees"));
    }
}
