use super::RegistryParams;
use crate::call::{Call, CallCodec};
use crate::error::RegistryError;
use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Probe implemented by every pool newer than 1.0.
pub const TYPE_AND_VERSION_METHOD: &str = "typeAndVersion";

pub const CURRENT_RATE_LIMITER_STATE_METHOD: &str = "currentRateLimiterState";
pub const OFF_RAMP_RATE_LIMITER_STATE_METHOD: &str = "getCurrentOffRampRateLimiterState";
pub const INBOUND_RATE_LIMITER_STATE_METHOD: &str = "getCurrentInboundRateLimiterState";

/// How to read the rate limiter of a token pool, by pool version.
///
/// Supporting a new pool version means adding a variant and its arm in [`ReaderStrategy::query_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderStrategy {
    /// Legacy pools. They do not implement `typeAndVersion`.
    V1_0,
    /// Pools 1.1 and 1.2, rate limited per off ramp.
    V1_2,
    /// Pools 1.4 and 1.5, rate limited per remote chain.
    V1_4,
}

impl ReaderStrategy {
    pub fn for_version(version: &TypeAndVersion) -> Option<Self> {
        match (version.major, version.minor, version.patch) {
            (1, 0, 0) => Some(Self::V1_0),
            (1, 1, 0) | (1, 2, 0) => Some(Self::V1_2),
            (1, 4, 0) | (1, 5, 0) => Some(Self::V1_4),
            _ => None,
        }
    }

    /// Builds the call returning the pool's current `TokenBucket`.
    pub fn query_call(&self, codec: &Arc<dyn CallCodec>, pool: Address, params: &RegistryParams) -> Call {
        let codec = Arc::clone(codec);
        match self {
            Self::V1_0 => Call::new(codec, CURRENT_RATE_LIMITER_STATE_METHOD, pool, vec![]),
            Self::V1_2 => {
                Call::new(codec, OFF_RAMP_RATE_LIMITER_STATE_METHOD, pool, vec![DynSolValue::Address(params.off_ramp)])
            }
            Self::V1_4 => Call::new(
                codec,
                INBOUND_RATE_LIMITER_STATE_METHOD,
                pool,
                vec![DynSolValue::Uint(U256::from(params.remote_chain_selector), 64)],
            ),
        }
    }
}

impl fmt::Display for ReaderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1_0 => write!(f, "v1.0"),
            Self::V1_2 => write!(f, "v1.2"),
            Self::V1_4 => write!(f, "v1.4"),
        }
    }
}

/// Parsed `typeAndVersion()` answer, e.g. `BurnMintTokenPool 1.4.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAndVersion {
    pub kind: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl FromStr for TypeAndVersion {
    type Err = RegistryError;

    /// Pre-release suffixes such as `1.4.0-dev` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidTypeAndVersion(s.to_string());

        let (kind, version) = s.trim().rsplit_once(' ').ok_or_else(invalid)?;
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(invalid());
        }

        let version = version.split_once('-').map_or(version, |(version, _suffix)| version);
        let parts = version.split('.').map(u64::from_str).collect::<Result<Vec<_>, _>>().map_err(|_| invalid())?;
        let [major, minor, patch] = parts[..] else {
            return Err(invalid());
        };

        Ok(Self { kind: kind.to_string(), major, minor, patch })
    }
}
