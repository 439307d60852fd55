//! System prompt construction
//!
//! Renders an agent profile and the contact context into the system prompt
//! used for every completion on a call.

use serde_json::Value;
use std::collections::HashMap;

use call_agent_core::AgentProfile;

/// Marker the model emits when the conversation is finished
pub const END_CALL_MARKER: &str = "[END_CALL]";

const VOICE_RULES: &[&str] = &[
    "Keep responses SHORT (1-3 sentences). You are speaking, not writing.",
    "Ask one question at a time and wait for the answer.",
    "Never use markdown, bullet points, or special characters.",
    "Use natural speech patterns: contractions, and the caller's first name.",
    "If you need to look something up, say a natural filler like \"Let me check that for you.\"",
    "If the caller is clearly not interested after 2 attempts, thank them and end the call politely.",
    "NEVER be deceptive about being an AI if directly asked.",
];

/// Builder for the per-call system prompt
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder<'a> {
    profile: &'a AgentProfile,
    contact_name: Option<&'a str>,
    contact_metadata: Option<&'a HashMap<String, Value>>,
}

impl<'a> SystemPromptBuilder<'a> {
    pub fn new(profile: &'a AgentProfile) -> Self {
        Self {
            profile,
            contact_name: None,
            contact_metadata: None,
        }
    }

    pub fn contact_name(mut self, name: Option<&'a str>) -> Self {
        self.contact_name = name.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn contact_metadata(mut self, metadata: &'a HashMap<String, Value>) -> Self {
        self.contact_metadata = Some(metadata);
        self
    }

    fn call_context(&self) -> String {
        let mut context = match self.contact_name {
            Some(name) => format!("You are calling {}.", name),
            None => String::new(),
        };

        if let Some(metadata) = self.contact_metadata {
            let mut keys: Vec<&String> = metadata.keys().collect();
            keys.sort();
            let details: Vec<String> = keys
                .into_iter()
                .filter_map(|k| render_value(&metadata[k]).map(|v| format!("{}: {}", k, v)))
                .collect();
            if !details.is_empty() {
                if !context.is_empty() {
                    context.push(' ');
                }
                context.push_str(&format!("Known details: {}.", details.join(", ")));
            }
        }

        context
    }

    pub fn build(&self) -> String {
        let p = self.profile;
        let mut prompt = format!(
            "You are {}, calling on behalf of {}.\n\n\
             PERSONA:\n{}\n\n\
             PRIMARY GOAL:\n{}\n\n\
             RULES & CONSTRAINTS:\n{}\n\n\
             ESCALATION POLICY:\n{}\n\n\
             CALL CONTEXT:\n{}\n\n\
             VOICE CONVERSATION RULES:\n",
            p.agent_name,
            p.company_name,
            p.persona,
            p.primary_goal,
            p.constraints,
            p.escalation_policy,
            self.call_context(),
        );

        for rule in VOICE_RULES {
            prompt.push_str("- ");
            prompt.push_str(rule);
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "- When the conversation is over, say goodbye and end your reply with {}.",
            END_CALL_MARKER
        ));

        prompt
    }
}

/// Skip empty and null values; strings render without quotes
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}
