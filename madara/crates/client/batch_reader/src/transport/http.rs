use super::{BatchRequest, BatchTransport, RpcItemError};
use crate::error::TransportError;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Code reported for a batch item the node did not answer (JSON-RPC "internal error").
const MISSING_RESPONSE_CODE: i64 = -32603;

/// Sends each job as one JSON-RPC 2.0 batch of `eth_call`s over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBatchTransport {
    client: reqwest::Client,
    url: Url,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: usize,
    method: &'static str,
    params: (EthCallParams<'a>, BlockNumberOrTag),
}

#[derive(Serialize)]
struct EthCallParams<'a> {
    to: &'a Address,
    data: &'a Bytes,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Bytes>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

impl HttpBatchTransport {
    pub fn new(url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Nodes answer a malformed or rejected batch with one error object instead of an array.
    fn parse_batch_body(body: &[u8]) -> Result<Vec<JsonRpcResponse>, TransportError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| TransportError::InvalidResponse(format!("Body is not JSON: {e}")))?;

        match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)
                .map_err(|e| TransportError::InvalidResponse(format!("Malformed batch item: {e}"))),
            serde_json::Value::Object(ref object) if object.contains_key("error") => {
                let error = object.get("error").map(ToString::to_string).unwrap_or_default();
                Err(TransportError::Rpc(error))
            }
            other => Err(TransportError::InvalidResponse(format!("Expected a batch array, got {other}"))),
        }
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn execute(&self, block: BlockNumberOrTag, requests: &mut [BatchRequest]) -> Result<(), TransportError> {
        let batch: Vec<JsonRpcRequest<'_>> = requests
            .iter()
            .enumerate()
            .map(|(id, request)| JsonRpcRequest {
                jsonrpc: "2.0",
                id,
                method: "eth_call",
                params: (EthCallParams { to: &request.to, data: &request.data }, block),
            })
            .collect();

        let response = self.client.post(self.url.clone()).json(&batch).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }
        let body = response.bytes().await?;
        let items = Self::parse_batch_body(&body)?;

        let mut answered = vec![false; requests.len()];
        for item in items {
            // Responses may come back in any order, the id is the position in the batch.
            let Some(position) = item.id.and_then(|id| usize::try_from(id).ok()) else {
                tracing::trace!("Ignoring batch item without a usable id");
                continue;
            };
            let Some(request) = requests.get_mut(position) else {
                tracing::trace!("Ignoring batch item with unknown id {position}");
                continue;
            };
            if answered[position] {
                tracing::trace!("Ignoring repeated batch item with id {position}");
                continue;
            }
            answered[position] = true;
            match item.error {
                Some(error) => request.error = Some(RpcItemError { code: error.code, message: error.message }),
                None => request.response = item.result,
            }
        }

        for (request, _) in requests.iter_mut().zip(answered).filter(|(_, answered)| !answered) {
            let message = "No response for this item in batch".to_string();
            request.error = Some(RpcItemError { code: MISSING_RESPONSE_CODE, message });
        }

        Ok(())
    }
}
