//! Tool interface and per-call execution context

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use call_agent_core::{TelephonyControl, ToolDefinition};

use crate::ToolError;

/// Arguments as decoded from the model's tool call
pub type ToolArgs = HashMap<String, Value>;

/// What a tool knows about the call it runs in
#[derive(Clone)]
pub struct ToolContext {
    pub call_id: String,
    pub tenant_id: String,
    pub contact_phone: String,
    pub contact_metadata: HashMap<String, Value>,
    /// Provider handle for in-call commands; absent before the call connects
    pub control_id: Option<String>,
    /// Profile-level transfer destination
    pub transfer_number: Option<String>,
    pub telephony: Option<Arc<dyn TelephonyControl>>,
}

impl ToolContext {
    pub fn new(call_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tenant_id: tenant_id.into(),
            contact_phone: String::new(),
            contact_metadata: HashMap::new(),
            control_id: None,
            transfer_number: None,
            telephony: None,
        }
    }

    pub fn with_contact(mut self, phone: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        self.contact_phone = phone.into();
        self.contact_metadata = metadata;
        self
    }

    pub fn with_telephony(
        mut self,
        telephony: Arc<dyn TelephonyControl>,
        control_id: Option<String>,
    ) -> Self {
        self.telephony = Some(telephony);
        self.control_id = control_id;
        self
    }

    pub fn with_transfer_number(mut self, number: Option<String>) -> Self {
        self.transfer_number = number;
        self
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("call_id", &self.call_id)
            .field("tenant_id", &self.tenant_id)
            .field("control_id", &self.control_id)
            .field("telephony", &self.telephony.is_some())
            .finish()
    }
}

/// A capability the model may invoke mid-call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments
    fn parameters(&self) -> Value;

    /// Overrides the dispatcher's default timeout
    fn timeout_secs(&self) -> Option<u64> {
        None
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Builder for an object-typed argument schema
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "string", "description": description}), required)
    }

    pub fn build(self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// Optional string argument; blank counts as absent
pub fn str_arg<'a>(args: &'a ToolArgs, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Required string argument
pub fn required_str<'a>(args: &'a ToolArgs, name: &str) -> Result<&'a str, ToolError> {
    str_arg(args, name).ok_or_else(|| ToolError::invalid_params(format!("{} is required", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_schema() {
        let schema = ObjectSchema::new()
            .string("date", "Date", true)
            .string("notes", "Notes", false)
            .build();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["date"]["type"], "string");
        assert_eq!(schema["required"], json!(["date"]));
    }

    #[test]
    fn test_argument_helpers() {
        let mut args = ToolArgs::new();
        args.insert("name".to_string(), json!("  Jordan "));
        args.insert("blank".to_string(), json!(" "));
        args.insert("number".to_string(), json!(4));

        assert_eq!(str_arg(&args, "name"), Some("Jordan"));
        assert_eq!(str_arg(&args, "blank"), None);
        assert_eq!(str_arg(&args, "number"), None);
        assert!(matches!(
            required_str(&args, "missing"),
            Err(ToolError::InvalidParams(_))
        ));
    }
}
