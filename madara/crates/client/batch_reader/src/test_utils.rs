//! Fakes shared by the dispatcher and registry tests.

use crate::call::{Call, CallCodec, Output};
use crate::error::{CodecError, TransportError};
use crate::transport::{BatchRequest, BatchTransport, RpcItemError};
use alloy::dyn_abi::DynSolValue;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub enum ItemResponse {
    Data(Bytes),
    Missing,
    Error(RpcItemError),
}

type Responder = Box<dyn Fn(&BatchRequest) -> ItemResponse + Send + Sync>;

/// In-memory [`BatchTransport`] recording every batch it is asked to send.
pub struct FakeTransport {
    responder: Responder,
    max_working_batch: Option<usize>,
    delay: Option<Duration>,
    batches: Mutex<Vec<Vec<BatchRequest>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new(responder: impl Fn(&BatchRequest) -> ItemResponse + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            max_working_batch: None,
            delay: None,
            batches: Mutex::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answers every call with its own calldata.
    pub fn echo() -> Self {
        Self::new(|request| ItemResponse::Data(request.data.clone()))
    }

    /// Whole round trips with more than `max` requests fail.
    pub fn failing_above(mut self, max: usize) -> Self {
        self.max_working_batch = Some(max);
        self
    }

    pub fn always_failing(self) -> Self {
        self.failing_above(0)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn batches(&self) -> Vec<Vec<BatchRequest>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    /// Batch sizes with consecutive repeats collapsed, i.e. one entry per attempted limit.
    pub fn attempted_limits(&self) -> Vec<usize> {
        let mut sizes = self.batch_sizes();
        sizes.dedup();
        sizes
    }

    pub fn round_trips(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchTransport for FakeTransport {
    async fn execute(&self, _block: BlockNumberOrTag, requests: &mut [BatchRequest]) -> Result<(), TransportError> {
        self.batches.lock().unwrap().push(requests.to_vec());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.max_working_batch.is_some_and(|max| requests.len() > max) {
            return Err(TransportError::InvalidResponse(format!("batch of {} rejected", requests.len())));
        }
        for request in requests.iter_mut() {
            match (self.responder)(request) {
                ItemResponse::Data(data) => request.response = Some(data),
                ItemResponse::Missing => request.response = None,
                ItemResponse::Error(error) => request.error = Some(error),
            }
        }
        Ok(())
    }
}

/// Encodes its single integer argument as a 32 byte word and decodes such a word back into a `u64`.
pub struct SentinelCodec;

impl CallCodec for SentinelCodec {
    fn encode(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, CodecError> {
        match args {
            [DynSolValue::Uint(value, _)] => Ok(Bytes::from(value.to_be_bytes::<32>().to_vec())),
            _ => Err(CodecError::Encode { method: method.into(), message: "expected one uint".into() }),
        }
    }

    fn decode(&self, method: &str, data: &[u8]) -> Result<Vec<Output>, CodecError> {
        if data.len() != 32 {
            return Err(CodecError::Decode { method: method.into(), message: format!("{} bytes", data.len()) });
        }
        let value: u64 = U256::from_be_slice(data)
            .try_into()
            .map_err(|_| CodecError::Decode { method: method.into(), message: "overflow".into() })?;
        Ok(vec![Arc::new(value)])
    }
}

pub fn sentinel_target(n: u64) -> Address {
    Address::left_padding_from(&n.to_be_bytes())
}

/// `count` calls whose answers echo their position.
pub fn sentinel_calls(count: u64) -> Vec<Call> {
    let codec: Arc<dyn CallCodec> = Arc::new(SentinelCodec);
    (0..count)
        .map(|n| {
            let args = vec![DynSolValue::Uint(U256::from(n), 64)];
            Call::new(Arc::clone(&codec), "sentinel", sentinel_target(n), args)
        })
        .collect()
}
