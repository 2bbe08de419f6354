use crate::error::{CallError, CodecError};
use alloy::dyn_abi::DynSolValue;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A decoded value, as handed out by a [`CallCodec`].
///
/// Codecs are free to return concrete Rust types or loosely-typed structures such as
/// [`serde_json::Value`]. [`crate::coercion::extract`] turns either into the type the caller wants.
pub trait OutputValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    /// Neutral representation used for structural coercion.
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
    fn type_name(&self) -> &'static str;
}

impl<T> OutputValue for T
where
    T: Any + Serialize + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

pub type Output = Arc<dyn OutputValue>;

/// Encodes calls to request bytes and decodes the node's answer.
///
/// One codec is built at startup per contract ABI and shared by every call that targets that ABI.
#[cfg_attr(test, automock)]
pub trait CallCodec: Send + Sync {
    fn encode(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, CodecError>;
    fn decode(&self, method: &str, data: &[u8]) -> Result<Vec<Output>, CodecError>;
}

/// One read-only contract call.
#[derive(Clone)]
pub struct Call {
    codec: Arc<dyn CallCodec>,
    method: String,
    target: Address,
    args: Vec<DynSolValue>,
}

impl Call {
    pub fn new(codec: Arc<dyn CallCodec>, method: impl Into<String>, target: Address, args: Vec<DynSolValue>) -> Self {
        Self { codec, method: method.into(), target, args }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn args(&self) -> &[DynSolValue] {
        &self.args
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        self.codec.encode(&self.method, &self.args)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<Output>, CodecError> {
        self.codec.decode(&self.method, data)
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.target, self.method)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg:?}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Renders calls for error messages, e.g. `[0xab..cd.typeAndVersion(), ...]`.
pub fn render_calls(calls: &[Call]) -> String {
    let rendered: Vec<String> = calls.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

/// Outcome of one [`Call`], at the same position as the call in the batch.
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    pub outputs: Vec<Output>,
    pub error: Option<CallError>,
}

impl CallResult {
    pub fn ok(outputs: Vec<Output>) -> Self {
        Self { outputs, error: None }
    }

    pub fn failed(error: CallError) -> Self {
        Self { outputs: Vec::new(), error: Some(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A contiguous slice of a batch, sent in a single round trip.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub block: BlockNumberOrTag,
    pub calls: Vec<Call>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};

    #[test]
    fn call_renders_target_method_and_args() {
        let codec: Arc<dyn CallCodec> = Arc::new(MockCallCodec::new());
        let call = Call::new(
            codec,
            "getCurrentInboundRateLimiterState",
            address!("00000000000000000000000000000000000000aa"),
            vec![DynSolValue::Uint(U256::from(7u64), 64)],
        );

        let rendered = call.to_string().to_lowercase();
        assert!(
            rendered.starts_with("0x00000000000000000000000000000000000000aa.getcurrentinboundratelimiterstate(uint("),
            "{rendered}"
        );
        assert!(rendered.ends_with(")"), "{rendered}");
        assert_eq!(render_calls(&[]), "[]");
    }

    #[test]
    fn output_value_exposes_type_and_json() {
        let output: Output = Arc::new(String::from("LockReleaseTokenPool 1.4.0"));

        let value: &dyn OutputValue = &*output;

        assert_eq!(value.type_name(), std::any::type_name::<String>());
        assert_eq!(value.to_json().unwrap(), serde_json::json!("LockReleaseTokenPool 1.4.0"));
        assert_eq!(value.as_any().downcast_ref::<String>().map(String::as_str), Some("LockReleaseTokenPool 1.4.0"));
    }
}
