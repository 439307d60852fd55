//! Meeting booking
//!
//! With a calendar API key, available slots for the preferred date are read
//! from the calendar API. Without one, the caller gets a pre-filled
//! scheduling link.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use call_agent_config::ToolsConfig;

use crate::tool::{str_arg, ObjectSchema, Tool, ToolArgs, ToolContext};
use crate::ToolError;

const FALLBACK_SCHEDULING_LINK: &str = "https://calendly.com";
const CALENDAR_TIMEOUT_SECS: u64 = 15;
/// Slots offered back to the model
const MAX_SLOTS: usize = 3;

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    slots: Vec<Value>,
}

pub struct BookMeetingTool {
    api_url: String,
    api_key: Option<String>,
    scheduling_link: String,
    client: reqwest::Client,
}

impl BookMeetingTool {
    pub fn new(config: &ToolsConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CALENDAR_TIMEOUT_SECS))
            .build()
            .map_err(|e| ToolError::internal(e.to_string()))?;

        let scheduling_link = if config.scheduling_link.trim().is_empty() {
            FALLBACK_SCHEDULING_LINK.to_string()
        } else {
            config.scheduling_link.clone()
        };

        Ok(Self {
            api_url: config.calendar_api_url.trim_end_matches('/').to_string(),
            api_key: config.calendar_api_key.clone().filter(|k| !k.is_empty()),
            scheduling_link,
            client,
        })
    }

    /// Scheduling link with the invitee's details pre-filled
    fn prefilled_link(&self, name: Option<&str>, email: Option<&str>) -> String {
        let Ok(mut url) = Url::parse(&self.scheduling_link) else {
            return self.scheduling_link.clone();
        };
        if name.is_some() || email.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(name) = name {
                query.append_pair("name", name);
            }
            if let Some(email) = email {
                query.append_pair("email", email);
            }
        }
        url.to_string()
    }

    async fn availability(&self, api_key: &str, date: &str) -> Result<Vec<Value>, ToolError> {
        let response = self
            .client
            .get(format!("{}/availability", self.api_url))
            .bearer_auth(api_key)
            .query(&[("date", date)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::unavailable(format!(
                "Calendar API returned {}",
                response.status()
            )));
        }

        let body: AvailabilityResponse = response
            .json()
            .await
            .map_err(|e| ToolError::execution_failed(format!("Invalid calendar response: {}", e)))?;
        Ok(body.slots)
    }
}

#[async_trait]
impl Tool for BookMeetingTool {
    fn name(&self) -> &str {
        "book_meeting"
    }

    fn description(&self) -> &str {
        "Book a meeting with the caller. Collect their preferred date and, if possible, \
         their name and email before calling this."
    }

    fn parameters(&self) -> Value {
        ObjectSchema::new()
            .string("preferred_date", "Preferred date in YYYY-MM-DD format", false)
            .string("preferred_time", "Preferred time, e.g. 14:00", false)
            .string("invitee_name", "Full name of the person to invite", false)
            .string("invitee_email", "Email address of the person to invite", false)
            .string("notes", "Anything the host should know", false)
            .build()
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(CALENDAR_TIMEOUT_SECS)
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<Value, ToolError> {
        let name = str_arg(args, "invitee_name");
        let email = str_arg(args, "invitee_email");
        let date = str_arg(args, "preferred_date");

        if let Some(date) = date {
            NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                ToolError::invalid_params(format!("preferred_date '{}' is not YYYY-MM-DD", date))
            })?;
        }

        let link = self.prefilled_link(name, email);

        let (Some(api_key), Some(date)) = (self.api_key.as_deref(), date) else {
            tracing::debug!(call_id = %ctx.call_id, "Booking via scheduling link");
            return Ok(json!({
                "method": "scheduling_link",
                "scheduling_link": link,
                "message": format!(
                    "A scheduling link has been prepared for {}. They can book at their convenience.",
                    name.unwrap_or("the caller")
                ),
            }));
        };

        let slots = self.availability(api_key, date).await?;
        if slots.is_empty() {
            return Ok(json!({
                "method": "calendar",
                "available": false,
                "scheduling_link": link,
                "message": format!("No availability found for {}.", date),
            }));
        }

        Ok(json!({
            "method": "calendar",
            "available": true,
            "available_slots": slots.into_iter().take(MAX_SLOTS).collect::<Vec<_>>(),
            "scheduling_link": link,
            "preferred_time": str_arg(args, "preferred_time"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(link: &str) -> BookMeetingTool {
        BookMeetingTool::new(&ToolsConfig {
            scheduling_link: link.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_prefilled_link() {
        let tool = tool("https://cal.example.com/acme/intro");
        assert_eq!(
            tool.prefilled_link(Some("Jordan Lee"), Some("j@example.com")),
            "https://cal.example.com/acme/intro?name=Jordan+Lee&email=j%40example.com"
        );
        assert_eq!(tool.prefilled_link(None, None), "https://cal.example.com/acme/intro");
    }

    #[tokio::test]
    async fn test_link_fallback_without_api_key() {
        let mut args = ToolArgs::new();
        args.insert("invitee_name".to_string(), json!("Jordan"));
        args.insert("preferred_date".to_string(), json!("2026-10-20"));

        let out = tool("")
            .execute(&args, &ToolContext::new("c1", "t1"))
            .await
            .unwrap();
        assert_eq!(out["method"], "scheduling_link");
        assert_eq!(out["scheduling_link"], "https://calendly.com/?name=Jordan");
    }

    #[tokio::test]
    async fn test_rejects_malformed_date() {
        let mut args = ToolArgs::new();
        args.insert("preferred_date".to_string(), json!("next tuesday"));
        let err = tool("")
            .execute(&args, &ToolContext::new("c1", "t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
