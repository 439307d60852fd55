use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use call_agent_config::ToolsConfig;

use crate::tool::{str_arg, ObjectSchema, Tool, ToolArgs, ToolContext};
use crate::ToolError;

/// Pushes structured call data to an external endpoint (CRM, automation hooks)
pub struct SendWebhookTool {
    default_url: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl SendWebhookTool {
    pub fn new(config: &ToolsConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.webhook_timeout_secs))
            .build()
            .map_err(|e| ToolError::internal(e.to_string()))?;
        Ok(Self {
            default_url: config.webhook_url.clone().filter(|u| !u.is_empty()),
            timeout_secs: config.webhook_timeout_secs,
            client,
        })
    }

    fn payload(args: &ToolArgs, ctx: &ToolContext) -> Value {
        json!({
            "event_type": str_arg(args, "event_type").unwrap_or("call_update"),
            "call_id": ctx.call_id,
            "tenant_id": ctx.tenant_id,
            "data": args.get("data").filter(|d| d.is_object()).cloned().unwrap_or_else(|| json!({})),
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl Tool for SendWebhookTool {
    fn name(&self) -> &str {
        "send_webhook"
    }

    fn description(&self) -> &str {
        "Send data to an external webhook (e.g., CRM or automation endpoint). Use this to push \
         call outcomes, notes, or other structured data during the call."
    }

    fn parameters(&self) -> Value {
        ObjectSchema::new()
            .string(
                "event_type",
                "Type of event (e.g., 'meeting_booked', 'callback_requested')",
                false,
            )
            .property(
                "data",
                json!({
                    "type": "object",
                    "description": "Arbitrary JSON data to include in the payload",
                    "properties": {},
                }),
                false,
            )
            .string("webhook_url", "Override the configured webhook URL", false)
            .build()
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(self.timeout_secs)
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let url = str_arg(args, "webhook_url")
            .or(self.default_url.as_deref())
            .ok_or_else(|| ToolError::unavailable("No webhook URL configured"))?;

        let response = self
            .client
            .post(url)
            .json(&Self::payload(args, ctx))
            .send()
            .await?;

        let status = response.status();
        tracing::info!(call_id = %ctx.call_id, url, status = status.as_u16(), "Webhook sent");

        if !status.is_success() {
            return Err(ToolError::execution_failed(format!(
                "Webhook returned {}",
                status
            )));
        }

        Ok(json!({ "delivered": true, "status_code": status.as_u16() }))
    }
}
