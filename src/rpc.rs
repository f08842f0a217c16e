// src/rpc.rs
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned, INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::PaymasterError;
use crate::paymaster::{sponsored_paymaster_and_data, Paymaster};
use crate::types::{HealthResponse, PaymasterResponse, ProcessingResult};

/// Returned by `pm_sponsorUserOperation` when the operation asks for direct payment.
pub const NOT_SPONSORED_CODE: i32 = -32000;

#[rpc(server, namespace = "pm")]
pub trait PaymasterRpc {
    /// Runs the full pipeline and returns the processed operation, successful or not.
    #[method(name = "processUserOperation")]
    async fn process_user_operation(
        &self,
        user_operation: Value,
        entry_point_version: Option<String>,
    ) -> RpcResult<ProcessingResult>;

    /// Requests the paymaster to sponsor a user operation
    #[method(name = "sponsorUserOperation")]
    async fn sponsor(
        &self,
        user_operation: Value,
        entry_point_version: Option<String>,
    ) -> RpcResult<PaymasterResponse>;

    #[method(name = "health")]
    async fn health(&self) -> RpcResult<HealthResponse>;
}

pub struct PaymasterRpcImpl {
    paymaster: Arc<Paymaster>,
}

impl PaymasterRpcImpl {
    pub fn new(paymaster: Arc<Paymaster>) -> Self {
        Self { paymaster }
    }
}

fn rpc_error(e: &PaymasterError) -> ErrorObjectOwned {
    let code = if e.is_client_error() {
        INVALID_PARAMS_CODE
    } else {
        INTERNAL_ERROR_CODE
    };
    let body = e.to_error_body();
    ErrorObject::owned(code, format!("Paymaster error: {}", body.message), Some(body))
}

#[async_trait]
impl PaymasterRpcServer for PaymasterRpcImpl {
    async fn process_user_operation(
        &self,
        user_operation: Value,
        entry_point_version: Option<String>,
    ) -> RpcResult<ProcessingResult> {
        debug!("Received pm_processUserOperation request");
        Ok(self
            .paymaster
            .process_user_operation(&user_operation, entry_point_version.as_deref())
            .await)
    }

    async fn sponsor(
        &self,
        user_operation: Value,
        entry_point_version: Option<String>,
    ) -> RpcResult<PaymasterResponse> {
        debug!("Received pm_sponsorUserOperation request");

        let result = self
            .paymaster
            .process(&user_operation, entry_point_version.as_deref())
            .await
            .map_err(|e| {
                error!("Failed to sponsor operation: {}", e);
                rpc_error(&e)
            })?;

        match sponsored_paymaster_and_data(&result) {
            Some(paymaster_and_data) => {
                info!("Successfully sponsored operation {:?}", result.user_op_hash);
                Ok(PaymasterResponse { paymaster_and_data })
            }
            None => Err(ErrorObject::owned(
                NOT_SPONSORED_CODE,
                "UserOperation uses direct payment and needs no paymaster",
                None::<()>,
            )),
        }
    }

    async fn health(&self) -> RpcResult<HealthResponse> {
        Ok(self.paymaster.health())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ethers::types::Address;
    use serde_json::json;

    use super::*;
    use crate::paymaster::PaymasterSettings;
    use crate::paymaster_data::PAYMASTER_AND_DATA_V06_LEN;
    use crate::signer::SigningContext;

    fn rpc() -> PaymasterRpcImpl {
        let signing = SigningContext::new(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            Address::from_str("0x3720B69B7f30D92FACed624c39B1fd317408774B").unwrap(),
            11155111,
        )
        .unwrap();
        PaymasterRpcImpl::new(Arc::new(Paymaster::new(signing, PaymasterSettings::default())))
    }

    fn user_operation(fee: &str) -> Value {
        json!({
            "sender": "0x1234567890123456789012345678901234567890",
            "nonce": "0x0",
            "initCode": "0x",
            "callData": "0x",
            "callGasLimit": "0x5208",
            "verificationGasLimit": "0x186a0",
            "preVerificationGas": "0x5208",
            "maxFeePerGas": fee,
            "maxPriorityFeePerGas": fee,
            "paymasterAndData": "0x",
            "signature": "0x"
        })
    }

    #[test]
    fn should_register_namespaced_methods() {
        let module = rpc().into_rpc();
        let mut names: Vec<_> = module.method_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec!["pm_health", "pm_processUserOperation", "pm_sponsorUserOperation"]
        );
    }

    #[tokio::test]
    async fn should_sponsor_operation() {
        let response = rpc()
            .sponsor(user_operation("0x3b9aca00"), None)
            .await
            .unwrap();
        assert_eq!(response.paymaster_and_data.len(), PAYMASTER_AND_DATA_V06_LEN);
    }

    #[tokio::test]
    async fn should_refuse_to_sponsor_direct_payment() {
        let err = rpc().sponsor(user_operation("0x0"), None).await.unwrap_err();
        assert_eq!(err.code(), NOT_SPONSORED_CODE);
    }

    #[tokio::test]
    async fn should_map_invalid_operations_to_invalid_params() {
        let err = rpc()
            .sponsor(json!({ "sender": "0x1234567890123456789012345678901234567890" }), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS_CODE);
    }

    #[tokio::test]
    async fn should_return_failed_result_from_process() {
        let result = rpc()
            .process_user_operation(json!({ "nonce": "0x0" }), Some("0.7".to_string()))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, "INVALID_USER_OPERATION");
    }

    #[tokio::test]
    async fn should_report_health() {
        let health = rpc().health().await.unwrap();
        assert_eq!(health.status, "ok");
    }
}
