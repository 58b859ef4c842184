//! Accessors for loosely-typed tool parameters.
//!
//! Tools validate their own inputs; these helpers turn a missing or
//! mistyped parameter into `InvalidParams`.

use serde_json::{Map, Value};

use crate::error::McpError;

/// Parameters passed to a tool: an unordered string-keyed map.
pub type ToolParams = Map<String, Value>;

/// Converts a raw `params`/`arguments` value into [`ToolParams`].
///
/// `None` and `null` become an empty map.
///
/// # Errors
///
/// Returns `InvalidParams` when the value is not an object.
pub fn into_params(value: Option<Value>) -> Result<ToolParams, McpError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(McpError::InvalidParams(format!(
            "tool arguments must be an object, got {}",
            type_name(&other)
        ))),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_type(name: &str, expected: &str, got: &Value) -> McpError {
    McpError::InvalidParams(format!(
        "parameter '{name}' must be a {expected}, got {}",
        type_name(got)
    ))
}

/// A required string parameter.
///
/// # Errors
///
/// Returns `InvalidParams` if the parameter is missing or not a string.
pub fn required_str<'a>(params: &'a ToolParams, name: &str) -> Result<&'a str, McpError> {
    optional_str(params, name)?.ok_or_else(|| McpError::missing_param(name))
}

/// An optional string parameter. `null` counts as absent.
///
/// # Errors
///
/// Returns `InvalidParams` if the parameter is present but not a string.
pub fn optional_str<'a>(params: &'a ToolParams, name: &str) -> Result<Option<&'a str>, McpError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(wrong_type(name, "string", other)),
    }
}

/// A required number parameter.
///
/// # Errors
///
/// Returns `InvalidParams` if the parameter is missing or not a number.
pub fn required_f64(params: &ToolParams, name: &str) -> Result<f64, McpError> {
    optional_f64(params, name)?.ok_or_else(|| McpError::missing_param(name))
}

/// An optional number parameter. `null` counts as absent.
///
/// # Errors
///
/// Returns `InvalidParams` if the parameter is present but not a number.
pub fn optional_f64(params: &ToolParams, name: &str) -> Result<Option<f64>, McpError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| wrong_type(name, "number", value)),
    }
}

/// An optional non-negative integer parameter. `null` counts as absent.
///
/// # Errors
///
/// Returns `InvalidParams` if the parameter is present but not a
/// non-negative integer.
pub fn optional_u64(params: &ToolParams, name: &str) -> Result<Option<u64>, McpError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| wrong_type(name, "non-negative integer", value)),
    }
}

/// A required non-negative integer parameter.
///
/// # Errors
///
/// Returns `InvalidParams` if the parameter is missing or not a
/// non-negative integer.
pub fn required_u64(params: &ToolParams, name: &str) -> Result<u64, McpError> {
    optional_u64(params, name)?.ok_or_else(|| McpError::missing_param(name))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> ToolParams {
        into_params(Some(value)).unwrap()
    }

    #[test]
    fn into_params_accepts_object_and_null() {
        assert!(into_params(None).unwrap().is_empty());
        assert!(into_params(Some(Value::Null)).unwrap().is_empty());
        assert_eq!(params(json!({"a": 1})).len(), 1);
    }

    #[test]
    fn into_params_rejects_arrays() {
        let err = into_params(Some(json!([1, 2]))).unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(ref m) if m.contains("array")));
    }

    #[test]
    fn required_str_missing_and_mistyped() {
        let p = params(json!({"n": 3}));
        assert_eq!(
            required_str(&p, "message"),
            Err(McpError::missing_param("message"))
        );
        let err = required_str(&p, "n").unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn numbers_accept_integers_and_floats() {
        let p = params(json!({"a": 2, "b": 2.5, "c": null}));
        assert!((required_f64(&p, "a").unwrap() - 2.0).abs() < f64::EPSILON);
        assert!((required_f64(&p, "b").unwrap() - 2.5).abs() < f64::EPSILON);
        assert_eq!(optional_f64(&p, "c").unwrap(), None);
    }

    #[test]
    fn u64_rejects_negative() {
        let p = params(json!({"count": -1}));
        assert!(optional_u64(&p, "count").is_err());
        assert!(required_u64(&params(json!({})), "count").is_err());
    }
}
