pub mod http;

use crate::error::TransportError;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;

pub use http::HttpBatchTransport;

/// Error the node attached to a single item of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcItemError {
    pub code: i64,
    pub message: String,
}

/// An `eth_call` request, filled in place by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub to: Address,
    pub data: Bytes,
    /// `None` when the node sent no result. Some nodes do that instead of returning `0x`.
    pub response: Option<Bytes>,
    pub error: Option<RpcItemError>,
}

impl BatchRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self { to, data, response: None, error: None }
    }
}

/// Sends a batch of requests in exactly one network round trip.
///
/// Implementations must fill the response or error of every request at its own position and must
/// never reorder `requests`. An `Err` means the round trip as a whole failed.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn execute(&self, block: BlockNumberOrTag, requests: &mut [BatchRequest]) -> Result<(), TransportError>;
}
