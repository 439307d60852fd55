use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{str_arg, ObjectSchema, Tool, ToolArgs, ToolContext};
use crate::{ToolError, END_CALL_TOOL};

/// Signals the orchestrator to wrap up after the current reply
pub struct EndCallTool;

#[async_trait]
impl Tool for EndCallTool {
    fn name(&self) -> &str {
        END_CALL_TOOL
    }

    fn description(&self) -> &str {
        "End the current call. Use this when the conversation has naturally concluded, \
         the caller has asked to be removed, or the goal has been achieved."
    }

    fn parameters(&self) -> Value {
        ObjectSchema::new()
            .string(
                "reason",
                "Reason for ending the call (e.g., 'goal_achieved', 'not_interested', 'callback_requested')",
                false,
            )
            .build()
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let reason = str_arg(args, "reason").unwrap_or("conversation_complete");
        tracing::info!(call_id = %ctx.call_id, reason, "End of call requested");
        Ok(json!({
            "ended": true,
            "reason": reason,
            "message": "The call will be ended after the current response.",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_reason() {
        let out = EndCallTool
            .execute(&ToolArgs::new(), &ToolContext::new("c1", "t1"))
            .await
            .unwrap();
        assert_eq!(out["ended"], true);
        assert_eq!(out["reason"], "conversation_complete");
    }
}
