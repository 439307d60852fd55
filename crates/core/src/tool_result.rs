//! Tagged tool outcome
//!
//! Callers match on the variant instead of checking a `success` flag.
//! [`ToolResult::to_json`] renders the flat map the model sees.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Failure category of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    Timeout,
    Unavailable,
    Failed,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::InvalidArguments => "invalid_arguments",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::Unavailable => "unavailable",
            ToolErrorKind::Failed => "failed",
        }
    }
}

/// Result of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Ok { payload: Value },
    Error { kind: ToolErrorKind, message: String },
}

impl ToolResult {
    pub fn ok(payload: Value) -> Self {
        ToolResult::Ok { payload }
    }

    pub fn error(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        ToolResult::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Ok { .. })
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolResult::Ok { payload } => Some(payload),
            ToolResult::Error { .. } => None,
        }
    }

    /// Flat `{"success": bool, ...}` rendering for prompts and logs
    pub fn to_json(&self) -> Value {
        match self {
            ToolResult::Ok { payload } => {
                let mut map = Map::new();
                map.insert("success".to_string(), Value::Bool(true));
                match payload {
                    Value::Object(fields) => {
                        for (k, v) in fields {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                    Value::Null => {}
                    other => {
                        map.insert("result".to_string(), other.clone());
                    }
                }
                Value::Object(map)
            }
            ToolResult::Error { kind, message } => json!({
                "success": false,
                "error": message,
                "error_kind": kind.as_str(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_flattens_object_payload() {
        let r = ToolResult::ok(json!({"booked": true, "time": "3pm"}));
        let v = r.to_json();
        assert_eq!(v["success"], true);
        assert_eq!(v["booked"], true);
        assert_eq!(v["time"], "3pm");
    }

    #[test]
    fn test_error_rendering() {
        let r = ToolResult::error(ToolErrorKind::UnknownTool, "Unknown tool: fly");
        assert!(!r.is_ok());
        assert_eq!(
            r.to_json(),
            json!({"success": false, "error": "Unknown tool: fly", "error_kind": "unknown_tool"})
        );
    }

    #[test]
    fn test_tagged_serialization() {
        let r = ToolResult::error(ToolErrorKind::Timeout, "slow");
        let s = serde_json::to_value(&r).unwrap();
        assert_eq!(s["status"], "error");
        assert_eq!(s["kind"], "timeout");
    }
}
