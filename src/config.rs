// src/config.rs
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use ethers::types::Address;
use tracing::Level;

use crate::error::PaymasterError;
use crate::paymaster::PaymasterSettings;
use crate::paymaster_data::PaymasterGasLimits;
use crate::signer::SigningContext;
use crate::version::{EntryPointVersion, EntryPoints, ENTRY_POINT_V06, ENTRY_POINT_V07};

/// Every option can also be supplied through the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "ERC-4337 paymaster signing service", long_about = None)]
pub struct Args {
    /// Hex private key of the paymaster signer
    #[clap(long, env = "PAYMASTER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Deployed paymaster contract, embedded in every paymasterAndData
    #[clap(long, env = "PAYMASTER_CONTRACT_ADDRESS")]
    pub paymaster_address: Option<String>,

    #[clap(long, env = "ENTRYPOINT_V06_ADDRESS", default_value = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789")]
    pub entry_point_v06: String,

    #[clap(long, env = "ENTRYPOINT_V07_ADDRESS", default_value = "0x0000000071727De22E5E9d8BAf0edAc6f37da032")]
    pub entry_point_v07: String,

    /// Version used when a request does not name one
    #[clap(long, env = "ENTRYPOINT_VERSION", default_value = "0.6")]
    pub entry_point_version: String,

    #[clap(long, env = "CHAIN_ID", default_value_t = 11155111)]
    pub chain_id: u64,

    /// Seconds an authorization stays valid; 0 = no expiry
    #[clap(long, env = "PAYMASTER_VALIDITY_SECONDS", default_value_t = 0)]
    pub validity_seconds: u64,

    #[clap(long, env = "PAYMASTER_VERIFICATION_GAS_LIMIT", default_value_t = 100_000)]
    pub paymaster_verification_gas_limit: u128,

    #[clap(long, env = "PAYMASTER_POST_OP_GAS_LIMIT", default_value_t = 50_000)]
    pub paymaster_post_op_gas_limit: u128,

    /// 0 disables the result cache
    #[clap(long, env = "CACHE_TTL_SECONDS", default_value_t = 300)]
    pub cache_ttl_seconds: u64,

    /// Upper bound on cached results; the oldest are evicted first
    #[clap(long, env = "CACHE_MAX_ENTRIES", default_value_t = 10_000)]
    pub cache_max_entries: usize,

    #[clap(long, env = "CACHE_TIMEOUT_MS", default_value_t = 50)]
    pub cache_timeout_ms: u64,

    #[clap(long, env = "HTTP_ADDR", default_value = "127.0.0.1:8787")]
    pub http_addr: String,

    #[clap(long, env = "RPC_ADDR", default_value = "127.0.0.1:8545")]
    pub rpc_server_addr: String,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Parsed `LOG_LEVEL`; readable before the rest of the configuration so
    /// logging can be installed first.
    pub fn max_log_level(&self) -> Result<Level, PaymasterError> {
        Level::from_str(self.log_level.trim()).map_err(|_| {
            PaymasterError::Configuration(format!("LOG_LEVEL is not a valid level: {}", self.log_level))
        })
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct PaymasterConfig {
    pub signing: SigningContext,
    pub settings: PaymasterSettings,
    /// `None` when caching is disabled
    pub cache_ttl: Option<Duration>,
    pub cache_max_entries: usize,
    pub http_addr: SocketAddr,
    pub rpc_addr: SocketAddr,
}

fn address(name: &str, value: &str) -> Result<Address, PaymasterError> {
    Address::from_str(value.trim())
        .map_err(|_| PaymasterError::Configuration(format!("{name} is not a valid address: {value}")))
}

fn socket_addr(name: &str, value: &str) -> Result<SocketAddr, PaymasterError> {
    value
        .parse()
        .map_err(|_| PaymasterError::Configuration(format!("{name} is not a valid socket address: {value}")))
}

impl PaymasterConfig {
    pub fn from_args(args: &Args) -> Result<Self, PaymasterError> {
        let private_key = args
            .private_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PaymasterError::Configuration("PAYMASTER_PRIVATE_KEY is not set".to_string()))?;
        let paymaster = args
            .paymaster_address
            .as_deref()
            .filter(|addr| !addr.trim().is_empty())
            .ok_or_else(|| {
                PaymasterError::Configuration("PAYMASTER_CONTRACT_ADDRESS is not set".to_string())
            })
            .and_then(|addr| address("PAYMASTER_CONTRACT_ADDRESS", addr))?;

        let entry_points = EntryPoints {
            v06: address("ENTRYPOINT_V06_ADDRESS", &args.entry_point_v06)?,
            v07: address("ENTRYPOINT_V07_ADDRESS", &args.entry_point_v07)?,
        };
        if entry_points.v06 != ENTRY_POINT_V06 || entry_points.v07 != ENTRY_POINT_V07 {
            tracing::warn!("Using non-canonical EntryPoint addresses: {:?}", entry_points);
        }

        let default_version = EntryPointVersion::parse(&args.entry_point_version).ok_or_else(|| {
            PaymasterError::Configuration(format!(
                "ENTRYPOINT_VERSION must be 0.6 or 0.7, got {}",
                args.entry_point_version
            ))
        })?;

        if args.chain_id == 0 {
            return Err(PaymasterError::Configuration("CHAIN_ID must be non-zero".to_string()));
        }

        args.max_log_level()?;

        let signing = SigningContext::new(private_key, paymaster, args.chain_id)?;

        Ok(Self {
            signing,
            settings: PaymasterSettings {
                entry_points,
                default_version,
                validity_seconds: args.validity_seconds,
                gas_limits: PaymasterGasLimits {
                    verification_gas_limit: args.paymaster_verification_gas_limit,
                    post_op_gas_limit: args.paymaster_post_op_gas_limit,
                },
                cache_timeout: Duration::from_millis(args.cache_timeout_ms),
            },
            cache_ttl: (args.cache_ttl_seconds > 0).then(|| Duration::from_secs(args.cache_ttl_seconds)),
            cache_max_entries: args.cache_max_entries,
            http_addr: socket_addr("HTTP_ADDR", &args.http_addr)?,
            rpc_addr: socket_addr("RPC_ADDR", &args.rpc_server_addr)?,
        })
    }
}
