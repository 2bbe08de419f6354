//! Typed access to the loosely-typed outputs of a [`CallResult`].
//!
//! Codecs may hand out the exact Rust type a caller wants, or a generic structure (typically a JSON
//! object keyed by ABI field names) for complex return shapes. [`extract`] hides the difference: it
//! returns the value directly when the type already matches, and otherwise re-shapes it through its
//! JSON representation.

use crate::call::{CallResult, OutputValue};
use crate::error::ExtractError;
use serde::de::DeserializeOwned;
use std::any::type_name;

/// Extracts output `index` of `result` as a `T`.
///
/// A structural coercion that yields `T::default()` is rejected: an empty object deserializes into a
/// struct made only of defaults, which says nothing about the value being a `T`.
pub fn extract<T>(result: &CallResult, index: usize) -> Result<T, ExtractError>
where
    T: DeserializeOwned + Default + PartialEq + Clone + 'static,
{
    if let Some(error) = &result.error {
        return Err(ExtractError::CallFailed(error.clone()));
    }
    let output = result.outputs.get(index).ok_or(ExtractError::IndexOutOfRange { index, len: result.outputs.len() })?;
    let value: &dyn OutputValue = &**output;

    if let Some(typed) = value.as_any().downcast_ref::<T>() {
        return Ok(typed.clone());
    }

    let mismatch = || ExtractError::TypeMismatch { got: value.type_name().to_string(), want: type_name::<T>() };
    let coerced: T = value.to_json().and_then(serde_json::from_value).map_err(|_| mismatch())?;
    if coerced == T::default() {
        return Err(mismatch());
    }
    Ok(coerced)
}

/// Applies `f` to every result in order. The first error is returned, tagged with its position.
pub fn extract_all<T, F>(results: &[CallResult], mut f: F) -> Result<Vec<T>, ExtractError>
where
    F: FnMut(&CallResult) -> Result<T, ExtractError>,
{
    results
        .iter()
        .enumerate()
        .map(|(position, result)| f(result).map_err(|e| ExtractError::AtPosition { position, source: Box::new(e) }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Output;
    use crate::error::CallError;
    use assert_matches::assert_matches;
    use rstest::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PoolConfig {
        name: String,
        fee_bps: u64,
        is_enabled: bool,
    }

    fn result_of(outputs: Vec<Output>) -> CallResult {
        CallResult::ok(outputs)
    }

    #[test]
    fn returns_matching_type_directly() {
        let result = result_of(vec![Arc::new(String::from("BurnMintTokenPool 1.2.0")), Arc::new(true)]);

        assert_eq!(extract::<String>(&result, 0).unwrap(), "BurnMintTokenPool 1.2.0");
        assert!(extract::<bool>(&result, 1).unwrap());
    }

    #[test]
    fn coerces_loose_object_into_struct() {
        let result = result_of(vec![Arc::new(json!({ "name": "weth", "feeBps": 30, "isEnabled": true }))]);

        let config = extract::<PoolConfig>(&result, 0).unwrap();

        assert_eq!(config, PoolConfig { name: "weth".into(), fee_bps: 30, is_enabled: true });
    }

    #[test]
    fn coerces_between_numeric_types() {
        let result = result_of(vec![Arc::new(42u64)]);

        assert_eq!(extract::<u128>(&result, 0).unwrap(), 42);
    }

    #[rstest]
    #[case::incompatible_shape(json!("not a struct"))]
    #[case::missing_fields(json!({ "name": "weth" }))]
    #[case::only_defaults(json!({ "name": "", "feeBps": 0, "isEnabled": false }))]
    fn rejects_values_that_are_not_the_requested_type(#[case] value: serde_json::Value) {
        let result = result_of(vec![Arc::new(value)]);

        assert_matches!(
            extract::<PoolConfig>(&result, 0),
            Err(ExtractError::TypeMismatch { got, want }) => {
                assert_eq!(got, type_name::<serde_json::Value>());
                assert_eq!(want, type_name::<PoolConfig>());
            }
        );
    }

    #[test]
    fn reports_call_failure_before_anything_else() {
        let result = CallResult::failed(CallError::EmptyOutput { method: "typeAndVersion".into() });

        assert_matches!(
            extract::<String>(&result, 0),
            Err(ExtractError::CallFailed(CallError::EmptyOutput { method })) if method == "typeAndVersion"
        );
    }

    #[test]
    fn reports_out_of_range_index() {
        let result = result_of(vec![Arc::new(1u64)]);

        assert_eq!(extract::<u64>(&result, 3), Err(ExtractError::IndexOutOfRange { index: 3, len: 1 }));
    }

    #[test]
    fn extract_all_keeps_order_and_tags_first_error() {
        let results = vec![
            result_of(vec![Arc::new(String::from("a"))]),
            result_of(vec![Arc::new(String::from("b"))]),
            CallResult::failed(CallError::Decode("bad".into())),
            CallResult::failed(CallError::Decode("worse".into())),
        ];

        let firsts = extract_all(&results[..2], |r| extract::<String>(r, 0)).unwrap();
        assert_eq!(firsts, vec!["a".to_string(), "b".to_string()]);

        assert_matches!(
            extract_all(&results, |r| extract::<String>(r, 0)),
            Err(ExtractError::AtPosition { position: 2, source }) => {
                assert_eq!(*source, ExtractError::CallFailed(CallError::Decode("bad".into())));
            }
        );
    }
}
