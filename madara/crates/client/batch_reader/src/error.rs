use alloy::primitives::Address;
use thiserror::Error;

/// Failure of a [`CallCodec`](crate::call::CallCodec) to encode or decode a single call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid contract ABI: {0}")]
    InvalidAbi(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Failed to encode arguments of {method}: {message}")]
    Encode { method: String, message: String },

    #[error("Failed to decode output of {method}: {message}")]
    Decode { method: String, message: String },
}

/// Failure of a whole round trip. Every variant leads to a retry at a smaller batch size.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Node answered with http status {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid batch response: {0}")]
    InvalidResponse(String),

    #[error("Round trip timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Ethereum RPC error: {0}")]
    Rpc(String),
}

/// Failure attached to one call of a batch. Sibling calls are unaffected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("Call reverted or was rejected by the node (code {code}): {message}")]
    Rpc { code: i64, message: String },

    /// The contract returned no data. Usually means the method does not exist on this version of the contract.
    #[error("Empty output for {method}")]
    EmptyOutput { method: String },

    #[error("Decoding failed: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to encode {call}: {source}")]
    Encode { call: String, source: CodecError },

    #[error("Batch call failed even with one call per round trip: {source}; calls: {calls}")]
    Exhausted { calls: String, source: Box<DispatchError> },

    #[error("Batch call was cancelled")]
    Cancelled,

    #[error("Round trip worker failed: {0}")]
    Worker(String),
}

impl DispatchError {
    /// Whether the dispatcher should shrink the batch size and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Call failed: {0}")]
    CallFailed(CallError),

    #[error("Output index {index} out of range, call returned {len} outputs")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Type mismatch: got {got}, want {want}")]
    TypeMismatch { got: String, want: &'static str },

    #[error("Result {position}: {source}")]
    AtPosition { position: usize, source: Box<ExtractError> },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("typeAndVersion probe of pool {pool} failed: {source}")]
    ProbeFailed { pool: Address, source: ExtractError },

    #[error("Invalid typeAndVersion {0:?}")]
    InvalidTypeAndVersion(String),

    #[error("Pool {pool} reports unsupported version {type_and_version:?}")]
    UnsupportedVersion { pool: Address, type_and_version: String },

    #[error("No reader found for pool {0}")]
    PoolNotFound(Address),

    #[error("Failed to read rate limit of pool {pool}: {source}")]
    RateLimit { pool: Address, source: ExtractError },
}
