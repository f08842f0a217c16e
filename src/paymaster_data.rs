// src/paymaster_data.rs
//! Binary layout of the `paymasterAndData` authorization blob.
//!
//! v0.6: `paymaster(20) ∥ validUntil(6) ∥ validAfter(6) ∥ signature(65)`, 97 bytes.
//!
//! v0.7: EntryPoint v0.7 reads the paymaster gas limits straight after the
//! address, so the blob becomes `paymaster(20) ∥ verificationGasLimit(16) ∥
//! postOpGasLimit(16) ∥ validUntil(6) ∥ validAfter(6) ∥ signature(65)`, 129 bytes.
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::{Address, Bytes};

use crate::error::PaymasterError;
use crate::version::EntryPointVersion;

pub const ADDRESS_LEN: usize = 20;
pub const TIMESTAMP_LEN: usize = 6;
pub const GAS_LIMIT_LEN: usize = 16;
pub const SIGNATURE_LEN: usize = 65;
pub const SIGNING_PREFIX_LEN: usize = ADDRESS_LEN + 2 * TIMESTAMP_LEN;
pub const PAYMASTER_AND_DATA_V06_LEN: usize = SIGNING_PREFIX_LEN + SIGNATURE_LEN;
pub const PAYMASTER_AND_DATA_V07_LEN: usize = PAYMASTER_AND_DATA_V06_LEN + 2 * GAS_LIMIT_LEN;

/// Largest value a 6-byte `uint48` timestamp can hold.
pub const MAX_TIMESTAMP: u64 = (1 << 48) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidityWindow {
    /// 0 = no expiry
    pub valid_until: u64,
    /// 0 = valid immediately
    pub valid_after: u64,
}

impl ValidityWindow {
    pub fn new(valid_until: u64, valid_after: u64) -> Self {
        Self {
            valid_until: valid_until.min(MAX_TIMESTAMP),
            valid_after: valid_after.min(MAX_TIMESTAMP),
        }
    }

    /// Window starting now and lasting `seconds`; `0` means open-ended.
    pub fn starting_at(now: u64, seconds: u64) -> Self {
        if seconds == 0 {
            return Self::default();
        }
        Self::new(now.saturating_add(seconds), 0)
    }

    pub fn starting_now(seconds: u64) -> Result<Self, PaymasterError> {
        Ok(Self::starting_at(unix_now()?, seconds))
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> Result<u64, PaymasterError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|e| PaymasterError::Internal(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymasterGasLimits {
    pub verification_gas_limit: u128,
    pub post_op_gas_limit: u128,
}

impl Default for PaymasterGasLimits {
    fn default() -> Self {
        Self {
            verification_gas_limit: 100_000,
            post_op_gas_limit: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterAuthorization {
    pub paymaster: Address,
    /// Present only in the v0.7 layout.
    pub gas_limits: Option<PaymasterGasLimits>,
    pub window: ValidityWindow,
    pub signature: [u8; SIGNATURE_LEN],
}

fn put_timestamp(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.min(MAX_TIMESTAMP).to_be_bytes()[8 - TIMESTAMP_LEN..]);
}

fn read_timestamp(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word[8 - TIMESTAMP_LEN..].copy_from_slice(bytes);
    u64::from_be_bytes(word)
}

fn read_gas_limit(bytes: &[u8]) -> u128 {
    let mut word = [0u8; 16];
    word.copy_from_slice(bytes);
    u128::from_be_bytes(word)
}

/// `paymaster ∥ validUntil ∥ validAfter`: the part of the blob the signature covers.
pub fn signing_prefix(paymaster: Address, window: &ValidityWindow) -> [u8; SIGNING_PREFIX_LEN] {
    let mut buf = Vec::with_capacity(SIGNING_PREFIX_LEN);
    buf.extend_from_slice(paymaster.as_bytes());
    put_timestamp(&mut buf, window.valid_until);
    put_timestamp(&mut buf, window.valid_after);

    let mut prefix = [0u8; SIGNING_PREFIX_LEN];
    prefix.copy_from_slice(&buf);
    prefix
}

impl PaymasterAuthorization {
    pub fn encoded_len(&self) -> usize {
        match self.gas_limits {
            Some(_) => PAYMASTER_AND_DATA_V07_LEN,
            None => PAYMASTER_AND_DATA_V06_LEN,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut data = Vec::with_capacity(self.encoded_len());
        data.extend_from_slice(self.paymaster.as_bytes());
        if let Some(limits) = self.gas_limits {
            data.extend_from_slice(&limits.verification_gas_limit.to_be_bytes());
            data.extend_from_slice(&limits.post_op_gas_limit.to_be_bytes());
        }
        put_timestamp(&mut data, self.window.valid_until);
        put_timestamp(&mut data, self.window.valid_after);
        data.extend_from_slice(&self.signature);
        Bytes::from(data)
    }

    pub fn decode(data: &[u8], version: EntryPointVersion) -> Result<Self, PaymasterError> {
        let expected = match version {
            EntryPointVersion::V06 => PAYMASTER_AND_DATA_V06_LEN,
            EntryPointVersion::V07 => PAYMASTER_AND_DATA_V07_LEN,
        };
        if data.len() != expected {
            return Err(PaymasterError::InvalidUserOperation(format!(
                "paymasterAndData for EntryPoint v{version} must be {expected} bytes, got {}",
                data.len()
            )));
        }

        let paymaster = Address::from_slice(&data[..ADDRESS_LEN]);
        let mut offset = ADDRESS_LEN;
        let gas_limits = match version {
            EntryPointVersion::V06 => None,
            EntryPointVersion::V07 => {
                let verification_gas_limit =
                    read_gas_limit(&data[offset..offset + GAS_LIMIT_LEN]);
                let post_op_gas_limit = read_gas_limit(
                    &data[offset + GAS_LIMIT_LEN..offset + 2 * GAS_LIMIT_LEN],
                );
                offset += 2 * GAS_LIMIT_LEN;
                Some(PaymasterGasLimits {
                    verification_gas_limit,
                    post_op_gas_limit,
                })
            }
        };
        let valid_until = read_timestamp(&data[offset..offset + TIMESTAMP_LEN]);
        let valid_after = read_timestamp(&data[offset + TIMESTAMP_LEN..offset + 2 * TIMESTAMP_LEN]);
        offset += 2 * TIMESTAMP_LEN;

        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&data[offset..]);

        Ok(Self {
            paymaster,
            gas_limits,
            window: ValidityWindow::new(valid_until, valid_after),
            signature,
        })
    }
}
