// src/version.rs
//! EntryPoint protocol versions and the per-request policy derived from them.
use std::fmt;

use ethers::types::{Address, H160};
use serde::{Deserialize, Serialize};

/// Canonical EntryPoint v0.6 deployment (`0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789`).
pub const ENTRY_POINT_V06: Address = H160([
    0x5f, 0xf1, 0x37, 0xd4, 0xb0, 0xfd, 0xcd, 0x49, 0xdc, 0xa3, 0x0c, 0x7c, 0xf5, 0x7e, 0x57, 0x8a,
    0x02, 0x6d, 0x27, 0x89,
]);

/// Canonical EntryPoint v0.7 deployment (`0x0000000071727De22E5E9d8BAf0edAc6f37da032`).
pub const ENTRY_POINT_V07: Address = H160([
    0x00, 0x00, 0x00, 0x00, 0x71, 0x72, 0x7d, 0xe2, 0x2e, 0x5e, 0x9d, 0x8b, 0xaf, 0x0e, 0xda, 0xc6,
    0xf3, 0x7d, 0xa0, 0x32,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntryPointVersion {
    #[default]
    #[serde(rename = "0.6")]
    V06,
    #[serde(rename = "0.7")]
    V07,
}

impl EntryPointVersion {
    /// Lenient parse: `0.6`, `v0.6`, `0.6.0` and `06` are all accepted.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        let normalized = normalized.strip_prefix('v').unwrap_or(&normalized);
        match normalized {
            "0.6" | "0.6.0" | "06" => Some(EntryPointVersion::V06),
            "0.7" | "0.7.0" | "07" => Some(EntryPointVersion::V07),
            _ => None,
        }
    }

    /// Request value wins over configuration, configuration over the protocol default.
    /// Anything unparseable is skipped.
    pub fn resolve(requested: Option<&str>, configured: Option<&str>) -> Self {
        requested
            .and_then(Self::parse)
            .or_else(|| configured.and_then(Self::parse))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPointVersion::V06 => "0.6",
            EntryPointVersion::V07 => "0.7",
        }
    }
}

impl fmt::Display for EntryPointVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured EntryPoint addresses, one per protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    pub v06: Address,
    pub v07: Address,
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self {
            v06: ENTRY_POINT_V06,
            v07: ENTRY_POINT_V07,
        }
    }
}

impl EntryPoints {
    pub fn address(&self, version: EntryPointVersion) -> Address {
        match version {
            EntryPointVersion::V06 => self.v06,
            EntryPointVersion::V07 => self.v07,
        }
    }
}

/// Everything a single request needs to know about the protocol it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    pub version: EntryPointVersion,
    pub entry_point: Address,
    pub chain_id: u64,
}

impl VersionPolicy {
    pub fn new(version: EntryPointVersion, entry_points: &EntryPoints, chain_id: u64) -> Self {
        Self {
            version,
            entry_point: entry_points.address(version),
            chain_id,
        }
    }

    pub fn resolve(
        requested: Option<&str>,
        configured: EntryPointVersion,
        entry_points: &EntryPoints,
        chain_id: u64,
    ) -> Self {
        let version = EntryPointVersion::resolve(requested, Some(configured.as_str()));
        Self::new(version, entry_points, chain_id)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn should_match_canonical_entry_point_addresses() {
        assert_eq!(
            ENTRY_POINT_V06,
            Address::from_str("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789").unwrap()
        );
        assert_eq!(
            ENTRY_POINT_V07,
            Address::from_str("0x0000000071727De22E5E9d8BAf0edAc6f37da032").unwrap()
        );
    }

    #[test]
    fn should_parse_common_spellings() {
        assert_eq!(EntryPointVersion::parse("0.6"), Some(EntryPointVersion::V06));
        assert_eq!(EntryPointVersion::parse(" v0.7 "), Some(EntryPointVersion::V07));
        assert_eq!(EntryPointVersion::parse("0.7.0"), Some(EntryPointVersion::V07));
        assert_eq!(EntryPointVersion::parse("V06"), Some(EntryPointVersion::V06));
        assert_eq!(EntryPointVersion::parse("0.8"), None);
        assert_eq!(EntryPointVersion::parse(""), None);
    }

    #[test]
    fn should_accept_a_single_v_prefix_only() {
        assert_eq!(EntryPointVersion::parse("v0.6"), Some(EntryPointVersion::V06));
        assert_eq!(EntryPointVersion::parse("vv0.6"), None);
        assert_eq!(EntryPointVersion::parse("vvv0.7"), None);
    }

    #[test]
    fn should_prefer_request_over_configuration() {
        let policy = VersionPolicy::resolve(
            Some("0.7"),
            EntryPointVersion::V06,
            &EntryPoints::default(),
            11155111,
        );
        assert_eq!(policy.version, EntryPointVersion::V07);
        assert_eq!(policy.entry_point, ENTRY_POINT_V07);
        assert_eq!(policy.chain_id, 11155111);
    }

    #[test]
    fn should_fall_back_through_each_tier() {
        assert_eq!(
            EntryPointVersion::resolve(Some("garbage"), Some("0.7")),
            EntryPointVersion::V07
        );
        assert_eq!(
            EntryPointVersion::resolve(None, Some("nonsense")),
            EntryPointVersion::V06
        );
        assert_eq!(EntryPointVersion::resolve(None, None), EntryPointVersion::V06);
    }

    #[test]
    fn should_use_configured_addresses() {
        let custom = EntryPoints {
            v06: Address::repeat_byte(0x06),
            v07: Address::repeat_byte(0x07),
        };
        let policy = VersionPolicy::resolve(None, EntryPointVersion::V07, &custom, 1);
        assert_eq!(policy.entry_point, Address::repeat_byte(0x07));
    }

    #[test]
    fn should_serialize_as_dotted_version() {
        assert_eq!(
            serde_json::to_string(&EntryPointVersion::V07).unwrap(),
            "\"0.7\""
        );
    }
}
