use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{str_arg, ObjectSchema, Tool, ToolArgs, ToolContext};
use crate::ToolError;

/// Hands the call to a human at a configured number
pub struct TransferCallTool {
    default_number: Option<String>,
}

impl TransferCallTool {
    pub fn new(default_number: Option<String>) -> Self {
        Self { default_number }
    }
}

#[async_trait]
impl Tool for TransferCallTool {
    fn name(&self) -> &str {
        "transfer_call"
    }

    fn description(&self) -> &str {
        "Transfer the call to a human agent. Use when the caller asks to speak with a person, \
         or when the situation requires human intervention."
    }

    fn parameters(&self) -> Value {
        ObjectSchema::new()
            .string("reason", "Reason for the transfer", false)
            .build()
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let number = ctx
            .transfer_number
            .as_deref()
            .or(self.default_number.as_deref())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ToolError::unavailable("No transfer number configured"))?;

        let telephony = ctx
            .telephony
            .as_ref()
            .ok_or_else(|| ToolError::unavailable("Telephony control not available"))?;
        let control_id = ctx
            .control_id
            .as_deref()
            .ok_or_else(|| ToolError::unavailable("No call control ID for this call"))?;

        telephony
            .transfer(control_id, number)
            .await
            .map_err(|e| ToolError::execution_failed(e.to_string()))?;

        tracing::info!(
            call_id = %ctx.call_id,
            to = number,
            reason = str_arg(args, "reason").unwrap_or(""),
            "Call transfer issued"
        );

        Ok(json!({ "transferred": true, "transferred_to": number }))
    }
}
