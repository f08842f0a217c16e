// src/signer.rs
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::hash_message;
use tracing::info;

use crate::error::PaymasterError;

/// secp256k1 group order `n`.
pub const SECP256K1_N: U256 = U256([
    0xBFD2_5E8C_D036_4141,
    0xBAAE_DCE6_AF48_A03B,
    0xFFFF_FFFF_FFFF_FFFE,
    0xFFFF_FFFF_FFFF_FFFF,
]);

/// `n / 2`; canonical signatures have `s <= SECP256K1_HALF_N`.
pub const SECP256K1_HALF_N: U256 = U256([
    0xDFE9_2F46_681B_20A0,
    0x5D57_6E73_57A4_501D,
    0xFFFF_FFFF_FFFF_FFFF,
    0x7FFF_FFFF_FFFF_FFFF,
]);

/// Immutable signing material, built once at startup and shared by every request.
#[derive(Debug, Clone)]
pub struct SigningContext {
    wallet: LocalWallet,
    paymaster: Address,
    chain_id: u64,
}

impl SigningContext {
    pub fn new(private_key: &str, paymaster: Address, chain_id: u64) -> Result<Self, PaymasterError> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| PaymasterError::Configuration(format!("Invalid private key: {e}")))?
            .with_chain_id(chain_id);

        info!(
            "Initialized paymaster signer {:?} for paymaster {:?} on chain {}",
            wallet.address(),
            paymaster,
            chain_id
        );

        Ok(Self {
            wallet,
            paymaster,
            chain_id,
        })
    }

    pub fn signer_address(&self) -> Address {
        self.wallet.address()
    }

    pub fn paymaster(&self) -> Address {
        self.paymaster
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Signs `signing_hash` as an Ethereum personal message
    /// (`"\x19Ethereum Signed Message:\n32" ∥ hash`) and returns a low-s
    /// signature with `v` in {27, 28}.
    pub fn sign(&self, signing_hash: H256) -> Result<Signature, PaymasterError> {
        let digest = hash_message(signing_hash);
        let signature = self
            .wallet
            .sign_hash(digest)
            .map_err(|e| PaymasterError::Internal(format!("signing failed: {e}")))?;
        let signature = canonicalize(signature);
        debug_assert!(is_canonical(&signature));
        Ok(signature)
    }
}

fn flip_parity(v: u64) -> u64 {
    match v {
        0 => 1,
        1 => 0,
        27 => 28,
        28 => 27,
        other => other,
    }
}

/// Moves `s` into the lower half of the curve order, flipping the recovery id
/// to match, and normalizes `v` to 27/28.
pub fn canonicalize(signature: Signature) -> Signature {
    let Signature { r, mut s, mut v } = signature;
    if s > SECP256K1_HALF_N {
        s = SECP256K1_N - s;
        v = flip_parity(v);
    }
    if v < 27 {
        v += 27;
    }
    Signature { r, s, v }
}

pub fn is_canonical(signature: &Signature) -> bool {
    signature.s <= SECP256K1_HALF_N
}
