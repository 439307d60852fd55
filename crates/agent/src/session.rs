//! Building a live session from durable call data

use serde_json::Value;
use std::collections::HashMap;

use call_agent_core::{AgentProfile, CallRecord, CallSession};
use call_agent_llm::SystemPromptBuilder;

/// Who the agent is talking to
#[derive(Debug, Clone, Default)]
pub struct Contact {
    pub phone: String,
    pub name: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl Contact {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Contact as far as the call record knows it; metadata is not persisted
    pub fn from_record(record: &CallRecord) -> Self {
        Self {
            phone: record.contact_phone.clone(),
            name: record.contact_name.clone(),
            metadata: HashMap::new(),
        }
    }
}

/// Create the session for a call: prompt, voice and tools come from the profile
pub fn build_session(
    call_id: &str,
    profile: &AgentProfile,
    contact: &Contact,
    default_voice: &str,
) -> CallSession {
    let prompt = SystemPromptBuilder::new(profile)
        .contact_name(contact.name.as_deref())
        .contact_metadata(&contact.metadata)
        .build();

    let voice = if profile.voice_id.trim().is_empty() {
        default_voice
    } else {
        profile.voice_id.as_str()
    };

    CallSession::new(call_id, &profile.tenant_id, &profile.id, &contact.phone)
        .with_system_prompt(prompt)
        .with_voice(voice)
        .with_tools(profile.enabled_tools.iter().cloned())
        .with_contact_metadata(contact.metadata.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> AgentProfile {
        let mut profile = AgentProfile::new("p1", "t1");
        profile.agent_name = "Maya".to_string();
        profile.company_name = "Acme Solar".to_string();
        profile.enabled_tools = ["book_meeting".to_string()].into_iter().collect();
        profile
    }

    #[test]
    fn test_build_session_from_profile() {
        let mut metadata = HashMap::new();
        metadata.insert("city".to_string(), json!("Austin"));
        let contact = Contact::new("+15550001111").with_name("Dana").with_metadata(metadata);

        let session = build_session("c1", &profile(), &contact, "alloy");
        assert_eq!(session.call_id, "c1");
        assert_eq!(session.tenant_id, "t1");
        assert_eq!(session.agent_profile_id, "p1");
        assert_eq!(session.voice_id, "alloy");
        assert!(session.tools_enabled());
        assert!(session.system_prompt.contains("Dana"));
        assert!(session.system_prompt.contains("city: Austin"));
        assert_eq!(session.turn_count(), 0);
    }

    #[test]
    fn test_profile_voice_wins() {
        let mut profile = profile();
        profile.voice_id = "nova".to_string();
        let session = build_session("c1", &profile, &Contact::new("+1555"), "alloy");
        assert_eq!(session.voice_id, "nova");
    }

    #[test]
    fn test_contact_from_record() {
        let record = CallRecord {
            call_id: "c1".to_string(),
            contact_phone: "+1555".to_string(),
            contact_name: Some("Dana".to_string()),
            ..Default::default()
        };
        let contact = Contact::from_record(&record);
        assert_eq!(contact.phone, "+1555");
        assert_eq!(contact.name.as_deref(), Some("Dana"));
        assert!(contact.metadata.is_empty());
    }
}
