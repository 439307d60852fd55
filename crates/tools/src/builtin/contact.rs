use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{ObjectSchema, Tool, ToolArgs, ToolContext};
use crate::ToolError;

/// Reads back what is known about the person on the call
pub struct LookupContactTool;

#[async_trait]
impl Tool for LookupContactTool {
    fn name(&self) -> &str {
        "lookup_contact"
    }

    fn description(&self) -> &str {
        "Look up information about the person you're calling. Use this to personalize the conversation."
    }

    fn parameters(&self) -> Value {
        ObjectSchema::new().build()
    }

    async fn execute(&self, _args: &ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        if ctx.contact_metadata.is_empty() {
            return Ok(json!({
                "contact": null,
                "phone_number": ctx.contact_phone,
                "message": "No contact details on file for this number",
            }));
        }

        Ok(json!({
            "contact": ctx.contact_metadata,
            "phone_number": ctx.contact_phone,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_returns_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("first_name".to_string(), json!("Jordan"));
        let ctx = ToolContext::new("c1", "t1").with_contact("+15550001111", metadata);

        let out = LookupContactTool.execute(&ToolArgs::new(), &ctx).await.unwrap();
        assert_eq!(out["contact"]["first_name"], "Jordan");
        assert_eq!(out["phone_number"], "+15550001111");
    }

    #[tokio::test]
    async fn test_unknown_contact() {
        let out = LookupContactTool
            .execute(&ToolArgs::new(), &ToolContext::new("c1", "t1"))
            .await
            .unwrap();
        assert!(out["contact"].is_null());
    }
}
