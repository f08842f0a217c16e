// src/paymaster.rs
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Bytes, H256};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::ResultCache;
use crate::error::PaymasterError;
use crate::hashing::{operation_hash, paymaster_signing_hash};
use crate::normalizer;
use crate::operation::OperationVariant;
use crate::paymaster_data::{
    signing_prefix, unix_now, PaymasterAuthorization, PaymasterGasLimits, ValidityWindow,
};
use crate::signer::SigningContext;
use crate::types::{HealthResponse, PaymentMethod, ProcessingResult};
use crate::version::{EntryPointVersion, EntryPoints, VersionPolicy};

pub const SERVICE_NAME: &str = "aNode Paymaster";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MODULE_NAME: &str = "basic_paymaster";

/// Cached authorizations expiring within this many seconds are re-signed.
pub const CACHED_AUTHORIZATION_MARGIN_SECS: u64 = 10;

/// Lifecycle of a single request, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Normalized,
    Validated,
    Classified(PaymentMethod),
    HashComputed,
    Signed,
    Encoded,
    FeesZeroed,
    Completed(PaymentMethod),
    Failed,
}

fn enter(stage: Stage) {
    debug!("UserOperation stage: {:?}", stage);
}

/// Non-secret settings that shape every request.
#[derive(Debug, Clone)]
pub struct PaymasterSettings {
    pub entry_points: EntryPoints,
    pub default_version: EntryPointVersion,
    /// 0 = authorizations never expire
    pub validity_seconds: u64,
    pub gas_limits: PaymasterGasLimits,
    pub cache_timeout: Duration,
}

impl Default for PaymasterSettings {
    fn default() -> Self {
        Self {
            entry_points: EntryPoints::default(),
            default_version: EntryPointVersion::V06,
            validity_seconds: 0,
            gas_limits: PaymasterGasLimits::default(),
            cache_timeout: Duration::from_millis(50),
        }
    }
}

/// Both fee fields zero means the bundler pays; anything else asks for sponsorship.
pub fn classify(op: &OperationVariant) -> PaymentMethod {
    if op.gas_fields().fees_are_zero() {
        PaymentMethod::DirectPayment
    } else {
        PaymentMethod::Sponsorship
    }
}

pub struct Paymaster {
    signing: SigningContext,
    settings: PaymasterSettings,
    cache: Option<Arc<dyn ResultCache>>,
}

impl Paymaster {
    pub fn new(signing: SigningContext, settings: PaymasterSettings) -> Self {
        info!(
            "Initialized paymaster {:?} with signer {:?} (default EntryPoint v{}, validity {}s)",
            signing.paymaster(),
            signing.signer_address(),
            settings.default_version,
            settings.validity_seconds
        );
        Self {
            signing,
            settings,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(&self, requested_version: Option<&str>) -> VersionPolicy {
        VersionPolicy::resolve(
            requested_version,
            self.settings.default_version,
            &self.settings.entry_points,
            self.signing.chain_id(),
        )
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            service: SERVICE_NAME.to_string(),
            version: SERVICE_VERSION.to_string(),
            entry_point_version: self.settings.default_version.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }

    /// Like [`Paymaster::process`], but failures are folded into an
    /// unsuccessful result that echoes the input.
    pub async fn process_user_operation(
        &self,
        user_operation: &Value,
        requested_version: Option<&str>,
    ) -> ProcessingResult {
        match self.process(user_operation, requested_version).await {
            Ok(result) => result,
            Err(e) => ProcessingResult::failed(user_operation.clone(), &e),
        }
    }

    pub async fn process(
        &self,
        user_operation: &Value,
        requested_version: Option<&str>,
    ) -> Result<ProcessingResult, PaymasterError> {
        enter(Stage::Received);
        let result = self.run(user_operation, requested_version).await;
        match &result {
            Ok(result) => enter(Stage::Completed(result.payment_method)),
            Err(PaymasterError::Internal(detail)) => {
                enter(Stage::Failed);
                error!("Failed to process UserOperation: {}", detail);
            }
            Err(e) => {
                enter(Stage::Failed);
                info!("Rejected UserOperation: {}", e);
            }
        }
        result
    }

    async fn run(
        &self,
        user_operation: &Value,
        requested_version: Option<&str>,
    ) -> Result<ProcessingResult, PaymasterError> {
        let policy = self.policy(requested_version);

        let raw = normalizer::parse(user_operation)?;
        debug!(
            "Normalizing {} UserOperation for EntryPoint v{}",
            if raw.is_packed() { "packed" } else { "flat" },
            policy.version
        );
        enter(Stage::Normalized);
        normalizer::validate(&raw, policy.version)?;
        enter(Stage::Validated);
        let op = normalizer::build(raw, &policy)?;

        let fingerprint = operation_hash(&op, &policy);
        if let Some(hit) = self.cached(fingerprint).await {
            if authorization_outlives(&hit, op.version(), CACHED_AUTHORIZATION_MARGIN_SECS) {
                debug!("Cache hit for UserOperation {:?}", fingerprint);
                return Ok(ProcessingResult {
                    user_operation: hit.user_operation.with_signature(op.signature().clone()),
                    ..hit
                });
            }
            debug!("Cached authorization for {:?} is expiring, re-signing", fingerprint);
        }

        let payment_method = classify(&op);
        enter(Stage::Classified(payment_method));
        let sender = op.sender();

        let result = match payment_method {
            PaymentMethod::DirectPayment => {
                let op = op.into_direct_payment();
                enter(Stage::FeesZeroed);
                info!("UserOperation from {:?} uses direct payment", sender);
                ProcessingResult::completed(op, payment_method, None)
            }
            PaymentMethod::Sponsorship => {
                let op = self.sponsor(op, &policy)?;
                let user_op_hash = operation_hash(&op, &policy);
                info!(
                    "Sponsored UserOperation from {:?} on EntryPoint v{} ({:?})",
                    sender, policy.version, user_op_hash
                );
                ProcessingResult::completed(op, payment_method, Some(user_op_hash))
            }
        };

        self.store(fingerprint, &result).await;
        Ok(result)
    }

    /// Signs the operation and attaches the encoded authorization.
    fn sponsor(
        &self,
        op: OperationVariant,
        policy: &VersionPolicy,
    ) -> Result<OperationVariant, PaymasterError> {
        let paymaster = self.signing.paymaster();
        let window = ValidityWindow::starting_now(self.settings.validity_seconds)?;
        let prefix = signing_prefix(paymaster, &window);

        let signing_hash = paymaster_signing_hash(&op, &prefix, policy.chain_id);
        enter(Stage::HashComputed);
        let signature = self.signing.sign(signing_hash)?;
        enter(Stage::Signed);

        let gas_limits = match op.version() {
            EntryPointVersion::V06 => None,
            EntryPointVersion::V07 => Some(self.settings.gas_limits),
        };
        let authorization = PaymasterAuthorization {
            paymaster,
            gas_limits,
            window,
            signature: signature.into(),
        };
        let op = op.with_paymaster_and_data(authorization.encode());
        enter(Stage::Encoded);
        debug!(
            "Attached {} bytes of paymasterAndData valid until {}",
            op.paymaster_and_data().len(),
            window.valid_until
        );

        Ok(op)
    }

    async fn cached(&self, key: H256) -> Option<ProcessingResult> {
        let cache = self.cache.as_ref()?;
        match tokio::time::timeout(self.settings.cache_timeout, cache.get(key)).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!("Cache read error: {}", e);
                None
            }
            Err(_) => {
                warn!("Cache read timed out after {:?}", self.settings.cache_timeout);
                None
            }
        }
    }

    async fn store(&self, key: H256, result: &ProcessingResult) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        match tokio::time::timeout(self.settings.cache_timeout, cache.put(key, result)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Cache write error: {}", e),
            Err(_) => warn!("Cache write timed out after {:?}", self.settings.cache_timeout),
        }
    }
}

/// Whether a cached result can still be served: direct-payment results always
/// can, sponsored ones only while their window stays open past `margin_secs`.
fn authorization_outlives(
    result: &ProcessingResult,
    version: EntryPointVersion,
    margin_secs: u64,
) -> bool {
    let Some(data) = sponsored_paymaster_and_data(result) else {
        return true;
    };
    let authorization = match PaymasterAuthorization::decode(&data, version) {
        Ok(authorization) => authorization,
        Err(e) => {
            warn!("Discarding unreadable cached authorization: {}", e);
            return false;
        }
    };
    if authorization.window.valid_until == 0 {
        return true;
    }
    match unix_now() {
        Ok(now) => authorization.window.valid_until > now.saturating_add(margin_secs),
        Err(_) => false,
    }
}

/// Extracts the `paymasterAndData` a sponsored result carries.
pub fn sponsored_paymaster_and_data(result: &ProcessingResult) -> Option<Bytes> {
    match result.payment_method {
        PaymentMethod::Sponsorship if result.success => {
            result.user_operation.paymaster_and_data().cloned()
        }
        _ => None,
    }
}
