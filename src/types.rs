// src/types.rs
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::PaymasterError;
use crate::operation::{OperationV6, OperationV7, OperationVariant};

/// Incoming operation with every field optional, so that "absent" and "empty"
/// stay distinguishable until validation. Accepts both the flat v0.6 layout and
/// the packed v0.7 layout (plus the unpacked `factory`/`factoryData` pair).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUserOperation {
    pub sender: Option<Address>,
    pub nonce: Option<U256>,
    pub init_code: Option<Bytes>,
    pub factory: Option<Address>,
    pub factory_data: Option<Bytes>,
    pub call_data: Option<Bytes>,
    pub call_gas_limit: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub pre_verification_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub account_gas_limits: Option<U256>,
    pub gas_fees: Option<U256>,
    pub paymaster_and_data: Option<Bytes>,
    pub signature: Option<Bytes>,
}

impl RawUserOperation {
    pub fn is_packed(&self) -> bool {
        self.account_gas_limits.is_some() || self.gas_fees.is_some()
    }
}

/// Operation as returned to callers. `Unparsed` echoes an input that never
/// made it through normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserOperation {
    V06(OperationV6),
    V07(OperationV7),
    Unparsed(serde_json::Value),
}

impl From<OperationVariant> for UserOperation {
    fn from(op: OperationVariant) -> Self {
        match op {
            OperationVariant::V6(op) => UserOperation::V06(op),
            OperationVariant::V7(op) => UserOperation::V07(op),
        }
    }
}

impl UserOperation {
    pub fn with_signature(mut self, signature: Bytes) -> Self {
        match &mut self {
            UserOperation::V06(op) => op.signature = signature,
            UserOperation::V07(op) => op.signature = signature,
            UserOperation::Unparsed(value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert("signature".to_string(), serde_json::json!(signature));
                }
            }
        }
        self
    }

    pub fn paymaster_and_data(&self) -> Option<&Bytes> {
        match self {
            UserOperation::V06(op) => Some(&op.paymaster_and_data),
            UserOperation::V07(op) => Some(&op.paymaster_and_data),
            UserOperation::Unparsed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "paymaster")]
    Sponsorship,
    #[serde(rename = "direct-payment")]
    DirectPayment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub success: bool,
    pub user_operation: UserOperation,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_op_hash: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ProcessingResult {
    pub fn completed(
        user_operation: OperationVariant,
        payment_method: PaymentMethod,
        user_op_hash: Option<H256>,
    ) -> Self {
        Self {
            success: true,
            user_operation: user_operation.into(),
            payment_method,
            user_op_hash,
            error: None,
        }
    }

    /// Failure result echoing the caller's input untouched.
    pub fn failed(raw: serde_json::Value, error: &PaymasterError) -> Self {
        Self {
            success: false,
            user_operation: UserOperation::Unparsed(raw),
            payment_method: PaymentMethod::Sponsorship,
            user_op_hash: None,
            error: Some(error.to_error_body()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub user_operation: Option<serde_json::Value>,
    pub entry_point_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingInfo {
    pub modules: Vec<String>,
    pub total_duration: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub result: ProcessingResult,
    pub processing: ProcessingInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterResponse {
    pub paymaster_and_data: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub entry_point_version: String,
    pub timestamp: String,
}
