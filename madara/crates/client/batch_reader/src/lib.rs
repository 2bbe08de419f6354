//! Batched contract reads against an L1 node. This crate sends many independent `eth_call`s to a
//! node as few JSON-RPC batches as the node accepts, and builds version-aware token pool readers on
//! top of it.
//!
//! # Overview
//!
//! The crate is split into two layers: the [`DynamicLimitedBatchCaller`] turns a list of [`Call`]s
//! into a list of [`CallResult`]s, while the [`ReaderRegistry`] uses it to classify token pools by
//! version and read their rate limiters.
//!
//! # Batching and backoff
//!
//! Nodes and providers limit how many calls a single batch may carry, and rarely say what the limit
//! is. The batch caller starts at [`BatchCallerConfig::batch_size_limit`] calls per round trip and,
//! whenever a round trip fails as a whole, retries the entire batch with the limit divided by
//! [`BatchCallerConfig::back_off_multiplier`]:
//!
//! 1. **Partition**: split the calls into contiguous jobs of at most `limit` calls.
//! 2. **Round trips**: send the jobs, up to [`BatchCallerConfig::max_parallel_round_trips`] at once.
//! 3. **Recombination**: put every job's results back at the job's offset.
//! 4. **Backoff**: if any round trip failed, shrink the limit and start over. Once a single call per
//!    round trip still fails, give up and report the calls.
//!
//! Results are always in the order of the calls, whatever the partition and completion order.
//!
//! Errors attached to a single call (a revert, an undecodable answer, or an empty answer) never fail
//! the batch. They are reported in [`CallResult::error`] and left to the caller to interpret. An
//! empty answer in particular is reported as [`CallError::EmptyOutput`], which usually means the
//! method does not exist on this version of the contract.
//!
//! # Typed outputs
//!
//! Decoded outputs are loosely typed ([`Output`]). [`extract`] returns them as the type the caller
//! asks for, either directly or by re-shaping their JSON representation, so that an ABI struct
//! decoded as a JSON object can be read straight into a Rust struct.
//!
//! # Token pool readers
//!
//! Token pools expose their rate limiter through a different getter depending on their version.
//! The [`ReaderRegistry`] resolves each pool's version once with a batched `typeAndVersion()`
//! probe and caches the matching [`ReaderStrategy`]:
//!
//! - **v1.0**: legacy pools, which do not implement `typeAndVersion()` at all.
//! - **v1.2**: pools 1.1 and 1.2, read per off ramp.
//! - **v1.4**: pools 1.4 and 1.5, read per remote chain selector.
//!
//! Any other version is an error. Reading the rate limits of a set of pools costs one batch of
//! probes for the pools seen for the first time, then one batch of reads.
//!
//! ```ignore
//! let transport = Arc::new(HttpBatchTransport::new(l1_rpc_url));
//! let caller = Arc::new(DynamicLimitedBatchCaller::new(transport, BatchCallerConfig::default()));
//! let registry = ReaderRegistry::new(caller, Arc::new(token_pool_codec()?), params);
//!
//! let limits = registry.rate_limits(&pools, &cancel).await?;
//! ```
//!
//! # Configuration
//!
//! [`BatchCallerConfig`] can be loaded from a JSON file or built from the `--l1-batch-*` command
//! line arguments of [`BatchCallerParams`].

pub mod abi;
pub mod call;
pub mod coercion;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use abi::{token_pool_codec, AbiCodec};
pub use call::{BatchJob, Call, CallCodec, CallResult, Output, OutputValue};
pub use coercion::{extract, extract_all};
pub use config::{BatchCallerConfig, BatchCallerParams};
pub use dispatcher::{next_batch_limit, BatchCaller, DynamicLimitedBatchCaller};
pub use error::{CallError, CodecError, DispatchError, ExtractError, RegistryError, TransportError};
pub use registry::{ReaderRegistry, ReaderStrategy, RegistryParams, TokenBucketRateLimit};
pub use transport::{BatchRequest, BatchTransport, HttpBatchTransport};
