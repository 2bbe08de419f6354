//! Batched contract calls with an adaptive batch size.
//!
//! Calls are split into round trips of at most `limit` calls each. When any round trip fails as a
//! whole, the entire attempt is retried with `limit / back_off_multiplier`, until a single call per
//! round trip still fails, at which point the error is returned along with the offending calls.
//! Round trips of one attempt run in parallel, bounded by `max_parallel_round_trips`. Results always
//! come back in the order of the input calls.

use crate::call::{render_calls, BatchJob, Call, CallResult};
use crate::config::BatchCallerConfig;
use crate::error::{CallError, DispatchError, TransportError};
use crate::transport::{BatchRequest, BatchTransport};
use alloy::eips::BlockNumberOrTag;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs many independent calls against a node, returning one [`CallResult`] per call, in order.
#[async_trait]
pub trait BatchCaller: Send + Sync {
    /// Blocks until every call has a result or the batch failed for good. Per-call failures are
    /// reported in [`CallResult::error`] and never fail the batch.
    async fn batch_call(
        &self,
        calls: &[Call],
        block: BlockNumberOrTag,
        cancel: &CancellationToken,
    ) -> Result<Vec<CallResult>, DispatchError>;
}

/// Batch size to use after an attempt at `limit` failed.
///
/// Always strictly smaller than `limit` while `limit > 1`, which bounds the number of attempts.
pub fn next_batch_limit(limit: usize, back_off_multiplier: usize) -> usize {
    match limit.checked_div(back_off_multiplier) {
        None | Some(0) => 1,
        Some(next) if next == limit => 1,
        Some(next) => next,
    }
}

pub struct DynamicLimitedBatchCaller {
    transport: Arc<dyn BatchTransport>,
    config: BatchCallerConfig,
}

impl DynamicLimitedBatchCaller {
    pub fn new(transport: Arc<dyn BatchTransport>, config: BatchCallerConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &BatchCallerConfig {
        &self.config
    }

    async fn call_with_backoff(
        &self,
        calls: &[Call],
        block: BlockNumberOrTag,
    ) -> Result<Vec<CallResult>, DispatchError> {
        let mut limit = self.config.effective_batch_size_limit().min(calls.len());
        loop {
            let err = match self.call_at_limit(calls, block, limit).await {
                Ok(results) => return Ok(results),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if limit <= 1 {
                tracing::error!("Batch call of {} calls failed with one call per round trip: {err}", calls.len());
                return Err(DispatchError::Exhausted { calls: render_calls(calls), source: Box::new(err) });
            }

            let next = next_batch_limit(limit, self.config.back_off_multiplier);
            tracing::warn!("Batch call failed with limit {limit}, retrying with limit {next}: {err}");
            limit = next;
        }
    }

    async fn call_at_limit(
        &self,
        calls: &[Call],
        block: BlockNumberOrTag,
        limit: usize,
    ) -> Result<Vec<CallResult>, DispatchError> {
        let jobs: Vec<BatchJob> = calls.chunks(limit).map(|chunk| BatchJob { block, calls: chunk.to_vec() }).collect();
        let max_parallel = self.config.effective_max_parallel_round_trips();

        if max_parallel > 1 && jobs.len() > 1 {
            return self.run_parallel(jobs, max_parallel).await;
        }

        let mut results = Vec::with_capacity(calls.len());
        for job in &jobs {
            results.extend(round_trip(self.transport.as_ref(), job, self.config.round_trip_timeout).await?);
        }
        Ok(results)
    }

    /// Dropping the [`JoinSet`] on the first error aborts the round trips still running.
    async fn run_parallel(&self, jobs: Vec<BatchJob>, max_parallel: usize) -> Result<Vec<CallResult>, DispatchError> {
        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let job_count = jobs.len();
        let mut tasks = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.config.round_trip_timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| DispatchError::Worker(e.to_string()))?;
                round_trip(transport.as_ref(), &job, timeout).await.map(|results| (index, results))
            });
        }

        let mut slots: Vec<Option<Vec<CallResult>>> = (0..job_count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, results) = joined.map_err(|e| DispatchError::Worker(e.to_string()))??;
            slots[index] = Some(results);
        }

        let mut results = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let slot = slot.ok_or_else(|| DispatchError::Worker(format!("Round trip {index} returned no results")))?;
            results.extend(slot);
        }
        Ok(results)
    }
}

#[async_trait]
impl BatchCaller for DynamicLimitedBatchCaller {
    async fn batch_call(
        &self,
        calls: &[Call],
        block: BlockNumberOrTag,
        cancel: &CancellationToken,
    ) -> Result<Vec<CallResult>, DispatchError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Batch call of {} calls cancelled", calls.len());
                Err(DispatchError::Cancelled)
            }
            results = self.call_with_backoff(calls, block) => results,
        }
    }
}

/// Sends one job in a single transport round trip and decodes every answer.
async fn round_trip(
    transport: &dyn BatchTransport,
    job: &BatchJob,
    timeout: Option<Duration>,
) -> Result<Vec<CallResult>, DispatchError> {
    let mut requests = job
        .calls
        .iter()
        .map(|call| {
            call.encode()
                .map(|data| BatchRequest::new(call.target(), data))
                .map_err(|source| DispatchError::Encode { call: call.to_string(), source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(calls = requests.len(), block = %job.block, "Sending batch round trip");
    let execution = transport.execute(job.block, &mut requests);
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, execution).await.map_err(|_| TransportError::Timeout(timeout))??,
        None => execution.await?,
    }

    Ok(job.calls.iter().zip(requests).map(|(call, request)| decode_response(call, request)).collect())
}

fn decode_response(call: &Call, request: BatchRequest) -> CallResult {
    if let Some(error) = request.error {
        return CallResult::failed(CallError::Rpc { code: error.code, message: error.message });
    }

    // Nodes report "no data" either as a missing result or as `0x`. Both become an empty payload.
    let payload = request.response.unwrap_or_default();
    match call.decode(&payload) {
        Ok(outputs) => CallResult::ok(outputs),
        Err(_) if payload.is_empty() => {
            CallResult::failed(CallError::EmptyOutput { method: call.method().to_string() })
        }
        Err(e) => CallResult::failed(CallError::Decode(e.to_string())),
    }
}
