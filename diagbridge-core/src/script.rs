//! Script and call-frame metadata read from engine records.

use crate::props;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata of a compiled (or failed) script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInfo {
    pub script_id: String,
    pub url: String,
    pub line_count: i64,
    pub source_length: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<Value>,
}

impl ScriptInfo {
    /// Build from a script record or a compile event payload.
    pub fn from_engine(record: &Value) -> Self {
        Self {
            script_id: props::expect_int(record, "scriptId").to_string(),
            url: props::get_str(record, "fileName").unwrap_or_default().to_string(),
            line_count: props::get_int(record, "lineCount").unwrap_or(0),
            source_length: props::get_int(record, "sourceLength").unwrap_or(0),
            compile_error: props::get_property(record, "error").ok().cloned(),
        }
    }
}

/// One frame of the current call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub index: i64,
    pub script_id: String,
    pub line: i64,
    pub column: i64,
    pub function_name: Option<String>,
    pub function_handle: Option<i64>,
}

impl CallFrame {
    pub fn from_engine(record: &Value) -> Self {
        Self {
            index: props::expect_int(record, "index"),
            script_id: props::expect_int(record, "scriptId").to_string(),
            line: props::expect_int(record, "line"),
            column: props::expect_int(record, "column"),
            function_name: props::get_str(record, "functionName").ok().map(str::to_string),
            function_handle: props::get_int(record, "functionHandle").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_info_from_compile_error() {
        let payload = json!({
            "scriptId": 9,
            "fileName": "broken.js",
            "lineCount": 1,
            "sourceLength": 7,
            "error": { "message": "Expected ';'", "line": 0, "column": 6 }
        });
        let info = ScriptInfo::from_engine(&payload);
        assert_eq!(info.script_id, "9");
        assert_eq!(info.url, "broken.js");
        assert_eq!(info.compile_error.unwrap()["message"], "Expected ';'");
    }

    #[test]
    fn test_script_info_serializes_camel_case() {
        let info = ScriptInfo::from_engine(&json!({ "scriptId": 1 }));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, json!({ "scriptId": "1", "url": "", "lineCount": 0, "sourceLength": 0 }));
    }
}
