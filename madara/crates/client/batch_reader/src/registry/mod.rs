//! Rate limiter reads across token pools of mixed versions.
//!
//! A pool's version decides which getter returns its rate limiter, and with which arguments. The
//! registry learns every pool's version once, through a batched `typeAndVersion()` probe, and keeps
//! the resulting [`ReaderStrategy`] for its whole lifetime. Pools that do not implement the probe
//! are legacy 1.0 pools.

mod rate_limit;
mod strategy;

pub use rate_limit::TokenBucketRateLimit;
pub use strategy::{
    ReaderStrategy, TypeAndVersion, CURRENT_RATE_LIMITER_STATE_METHOD, INBOUND_RATE_LIMITER_STATE_METHOD,
    OFF_RAMP_RATE_LIMITER_STATE_METHOD, TYPE_AND_VERSION_METHOD,
};

use crate::call::{Call, CallCodec, CallResult};
use crate::coercion::{extract, extract_all};
use crate::dispatcher::BatchCaller;
use crate::error::{CallError, DispatchError, ExtractError, RegistryError};
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Arguments of the version specific getters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryParams {
    /// Off ramp whose limits are read from 1.2 pools.
    pub off_ramp: Address,
    /// Source chain whose limits are read from 1.4 pools.
    pub remote_chain_selector: u64,
}

pub struct ReaderRegistry {
    caller: Arc<dyn BatchCaller>,
    codec: Arc<dyn CallCodec>,
    params: RegistryParams,
    readers: RwLock<HashMap<Address, ReaderStrategy>>,
    /// Held for the duration of a probe round, so that a pool is never probed twice.
    resolving: Mutex<()>,
}

impl ReaderRegistry {
    pub fn new(caller: Arc<dyn BatchCaller>, codec: Arc<dyn CallCodec>, params: RegistryParams) -> Self {
        Self { caller, codec, params, readers: RwLock::default(), resolving: Mutex::new(()) }
    }

    /// Current rate limit of every pool, in the order of `pools`.
    pub async fn rate_limits(
        &self,
        pools: &[Address],
        cancel: &CancellationToken,
    ) -> Result<Vec<TokenBucketRateLimit>, RegistryError> {
        if pools.is_empty() {
            return Ok(Vec::new());
        }

        self.resolve_missing(pools, cancel).await?;

        let calls = {
            let readers = self.readers.read().await;
            pools
                .iter()
                .map(|pool| -> Result<Call, RegistryError> {
                    let strategy = readers.get(pool).ok_or(RegistryError::PoolNotFound(*pool))?;
                    Ok(strategy.query_call(&self.codec, *pool, &self.params))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let results = self.caller.batch_call(&calls, BlockNumberOrTag::Latest, cancel).await?;
        extract_all(&results, |result| extract::<TokenBucketRateLimit>(result, 0)).map_err(|e| match e {
            ExtractError::AtPosition { position, source } => {
                RegistryError::RateLimit { pool: pools.get(position).copied().unwrap_or_default(), source: *source }
            }
            source => RegistryError::RateLimit { pool: Address::ZERO, source },
        })
    }

    pub async fn strategy(&self, pool: Address) -> Option<ReaderStrategy> {
        self.readers.read().await.get(&pool).copied()
    }

    pub async fn cached_pools(&self) -> usize {
        self.readers.read().await.len()
    }

    /// Pools of `pools` without a known strategy, deduplicated, in order of first appearance.
    async fn missing(&self, pools: &[Address]) -> Vec<Address> {
        let readers = self.readers.read().await;
        let mut seen = HashSet::new();
        pools
            .iter()
            .copied()
            .filter(|pool| {
                if let Some(strategy) = readers.get(pool) {
                    tracing::trace!("Reader {strategy} for pool {pool} found in cache");
                    return false;
                }
                seen.insert(*pool)
            })
            .collect()
    }

    async fn resolve_missing(&self, pools: &[Address], cancel: &CancellationToken) -> Result<(), RegistryError> {
        if self.missing(pools).await.is_empty() {
            return Ok(());
        }

        let _resolving = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled.into()),
            guard = self.resolving.lock() => guard,
        };
        // Another caller may have resolved some of them while we waited.
        let missing = self.missing(pools).await;
        if missing.is_empty() {
            return Ok(());
        }

        let probes: Vec<Call> = missing
            .iter()
            .map(|pool| Call::new(Arc::clone(&self.codec), TYPE_AND_VERSION_METHOD, *pool, vec![]))
            .collect();
        let results = self.caller.batch_call(&probes, BlockNumberOrTag::Latest, cancel).await?;

        let classified = missing
            .iter()
            .zip(&results)
            .map(|(pool, result)| classify(*pool, result).map(|strategy| (*pool, strategy)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut readers = self.readers.write().await;
        for (pool, strategy) in classified {
            tracing::debug!("Classified token pool {pool} as {strategy}");
            readers.entry(pool).or_insert(strategy);
        }
        Ok(())
    }
}

fn classify(pool: Address, probe: &CallResult) -> Result<ReaderStrategy, RegistryError> {
    let type_and_version = match extract::<String>(probe, 0) {
        Ok(type_and_version) => type_and_version,
        Err(ExtractError::CallFailed(CallError::EmptyOutput { .. })) => return Ok(ReaderStrategy::V1_0),
        Err(source) => return Err(RegistryError::ProbeFailed { pool, source }),
    };

    let version: TypeAndVersion = type_and_version.parse()?;
    ReaderStrategy::for_version(&version).ok_or(RegistryError::UnsupportedVersion { pool, type_and_version })
}
