//! [`CallCodec`] backed by a Solidity JSON ABI.
//!
//! Elementary return values are handed out as concrete Rust types (`String`, `bool`, `Address`,
//! `u64` for integers of at most 64 bits, `U256` above). Structs come out as JSON objects keyed by
//! their ABI component names, so that [`crate::coercion::extract`] can shape them into any
//! `Deserialize` type with matching field names.

use crate::call::{CallCodec, Output};
use crate::error::CodecError;
use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi, Param};
use alloy::primitives::{Bytes, I256, U256};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

// abi subset shared by every token pool version we read from
const TOKEN_POOL_ABI: &str = include_str!("token_pool.json");

#[derive(Debug, Clone)]
pub struct AbiCodec {
    functions: HashMap<String, Function>,
}

/// Codec for the token pool methods used by [`crate::registry::ReaderRegistry`].
pub fn token_pool_codec() -> Result<AbiCodec, CodecError> {
    AbiCodec::from_json_str(TOKEN_POOL_ABI)
}

impl AbiCodec {
    /// Overloaded methods resolve to their first declaration.
    pub fn from_json_abi(abi: &JsonAbi) -> Self {
        let functions = abi
            .functions
            .iter()
            .filter_map(|(name, overloads)| overloads.first().map(|function| (name.clone(), function.clone())))
            .collect();
        Self { functions }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CodecError> {
        let abi: JsonAbi = serde_json::from_str(json).map_err(|e| CodecError::InvalidAbi(e.to_string()))?;
        Ok(Self::from_json_abi(&abi))
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.functions.contains_key(method)
    }

    fn function(&self, method: &str) -> Result<&Function, CodecError> {
        self.functions.get(method).ok_or_else(|| CodecError::UnknownMethod(method.to_string()))
    }
}

impl CallCodec for AbiCodec {
    fn encode(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, CodecError> {
        let encoded = self
            .function(method)?
            .abi_encode_input(args)
            .map_err(|e| CodecError::Encode { method: method.to_string(), message: e.to_string() })?;
        Ok(encoded.into())
    }

    fn decode(&self, method: &str, data: &[u8]) -> Result<Vec<Output>, CodecError> {
        let function = self.function(method)?;
        let values = function
            .abi_decode_output(data, true)
            .map_err(|e| CodecError::Decode { method: method.to_string(), message: e.to_string() })?;
        Ok(values.into_iter().zip(&function.outputs).map(|(value, param)| to_output(value, param)).collect())
    }
}

fn to_output(value: DynSolValue, param: &Param) -> Output {
    match value {
        DynSolValue::Bool(b) => Arc::new(b),
        DynSolValue::String(s) => Arc::new(s),
        DynSolValue::Address(address) => Arc::new(address),
        DynSolValue::Uint(n, bits) if bits <= 64 => match u64::try_from(n) {
            Ok(n) => Arc::new(n),
            Err(_) => Arc::new(n),
        },
        DynSolValue::Uint(n, _) => Arc::new(n),
        DynSolValue::Int(n, bits) if bits <= 64 => match i64::try_from(n) {
            Ok(n) => Arc::new(n),
            Err(_) => Arc::new(n),
        },
        DynSolValue::Int(n, _) => Arc::new(n),
        DynSolValue::Bytes(bytes) => Arc::new(Bytes::from(bytes)),
        DynSolValue::FixedBytes(word, 32) => Arc::new(word),
        DynSolValue::FixedBytes(word, size) => Arc::new(Bytes::copy_from_slice(&word[..size.min(32)])),
        other => Arc::new(to_json(&other, &param.components)),
    }
}

fn to_json(value: &DynSolValue, components: &[Param]) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Address(address) => Value::String(address.to_string()),
        DynSolValue::Uint(n, bits) if *bits <= 64 => {
            u64::try_from(*n).map(Value::from).unwrap_or_else(|_| uint_to_json(*n))
        }
        DynSolValue::Uint(n, _) => uint_to_json(*n),
        DynSolValue::Int(n, bits) if *bits <= 64 => {
            i64::try_from(*n).map(Value::from).unwrap_or_else(|_| int_to_json(*n))
        }
        DynSolValue::Int(n, _) => int_to_json(*n),
        DynSolValue::Bytes(bytes) => Value::String(Bytes::copy_from_slice(bytes).to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(Bytes::copy_from_slice(&word[..(*size).min(32)]).to_string())
        }
        // Array elements share the component layout of the array parameter.
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            Value::Array(items.iter().map(|item| to_json(item, components)).collect())
        }
        DynSolValue::Tuple(fields) => tuple_to_json(fields, components),
        other => Value::String(format!("{other:?}")),
    }
}

/// Unnamed tuples become arrays, there is no key to use.
fn tuple_to_json(fields: &[DynSolValue], components: &[Param]) -> Value {
    let nested = |i: usize| components.get(i).map(|c| c.components.as_slice()).unwrap_or_default();
    let named = components.len() == fields.len() && components.iter().all(|c| !c.name.is_empty());
    if !named {
        return Value::Array(fields.iter().enumerate().map(|(i, field)| to_json(field, nested(i))).collect());
    }

    let object: Map<String, Value> = fields
        .iter()
        .zip(components)
        .enumerate()
        .map(|(i, (field, component))| (component.name.clone(), to_json(field, nested(i))))
        .collect();
    Value::Object(object)
}

fn uint_to_json(n: U256) -> Value {
    Value::String(n.to_string())
}

fn int_to_json(n: I256) -> Value {
    Value::String(n.to_string())
}
