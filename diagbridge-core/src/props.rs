//! Typed access to properties of engine-constructed objects.

use crate::error::contract_violation;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("property {0:?} is missing")]
    Missing(String),
    #[error("property {name:?} is not {expected}")]
    WrongType { name: String, expected: &'static str },
    #[error("value is not an array")]
    NotAnArray,
}

pub fn has_property(object: &Value, name: &str) -> bool {
    object.get(name).is_some_and(|v| !v.is_null())
}

pub fn get_property<'a>(object: &'a Value, name: &str) -> Result<&'a Value, PropertyError> {
    match object.get(name) {
        Some(Value::Null) | None => Err(PropertyError::Missing(name.to_string())),
        Some(value) => Ok(value),
    }
}

/// Engine numbers are doubles; integral doubles are accepted.
pub fn get_int(object: &Value, name: &str) -> Result<i64, PropertyError> {
    let value = get_property(object, name)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or(PropertyError::WrongType { name: name.to_string(), expected: "an integer" })
}

pub fn get_bool(object: &Value, name: &str) -> Result<bool, PropertyError> {
    get_property(object, name)?
        .as_bool()
        .ok_or(PropertyError::WrongType { name: name.to_string(), expected: "a boolean" })
}

pub fn get_str<'a>(object: &'a Value, name: &str) -> Result<&'a str, PropertyError> {
    get_property(object, name)?
        .as_str()
        .ok_or(PropertyError::WrongType { name: name.to_string(), expected: "a string" })
}

pub fn elements(array: &Value) -> Result<&[Value], PropertyError> {
    array.as_array().map(Vec::as_slice).ok_or(PropertyError::NotAnArray)
}

/// Read an integer property that a conforming engine always provides.
pub fn expect_int(object: &Value, name: &str) -> i64 {
    get_int(object, name).unwrap_or_else(|e| contract_violation("reading engine object", e))
}

/// Elements of an array that a conforming engine always provides.
pub fn expect_elements<'a>(array: &'a Value, what: &str) -> &'a [Value] {
    elements(array).unwrap_or_else(|e| contract_violation(what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integral_doubles_read_as_int() {
        let obj = json!({ "line": 12.0, "column": 3, "ratio": 0.5 });
        assert_eq!(get_int(&obj, "line"), Ok(12));
        assert_eq!(get_int(&obj, "column"), Ok(3));
        assert!(matches!(get_int(&obj, "ratio"), Err(PropertyError::WrongType { .. })));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let obj = json!({ "breakpointId": null, "uncaught": false });
        assert!(!has_property(&obj, "breakpointId"));
        assert!(has_property(&obj, "uncaught"));
        assert_eq!(
            get_int(&obj, "breakpointId"),
            Err(PropertyError::Missing("breakpointId".into()))
        );
    }

    #[test]
    #[should_panic(expected = "engine contract violation")]
    fn test_expect_int_aborts_on_mistyped_property() {
        expect_int(&json!({ "breakpointId": "seven" }), "breakpointId");
    }

    #[test]
    fn test_property_error_is_a_std_error() {
        let obj = json!({ "uncaught": 1 });
        let err: Box<dyn std::error::Error> = Box::new(get_bool(&obj, "uncaught").unwrap_err());
        assert_eq!(err.to_string(), "property \"uncaught\" is not a boolean");
        assert_eq!(PropertyError::NotAnArray.to_string(), "value is not an array");

        let wrapped = anyhow::Error::new(PropertyError::Missing("line".into()));
        assert_eq!(wrapped.to_string(), "property \"line\" is missing");
        assert!(wrapped.downcast_ref::<PropertyError>().is_some());
    }
}
