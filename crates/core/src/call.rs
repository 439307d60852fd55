//! Durable call record and agent profile types
//!
//! The runtime reads an [`AgentProfile`] and writes narrow [`CallRecord`]
//! updates. Neither is owned here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default maximum call length in seconds
pub const DEFAULT_MAX_CALL_DURATION_SECS: u64 = 600;

/// Status of a call as tracked by the call record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Pending,
    Initiated,
    Ringing,
    Answered,
    Voicemail,
    Completed,
    Failed,
    NoAnswer,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Voicemail => "voicemail",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no_answer",
        }
    }

    /// No further lifecycle transitions are expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Voicemail | CallStatus::Completed | CallStatus::Failed | CallStatus::NoAnswer
        )
    }
}

/// Classified result of a finished call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    MeetingBooked,
    NotInterested,
    CallbackRequested,
    BadNumber,
    VoicemailLeft,
    NoAnswer,
    TransferredToHuman,
    #[default]
    Unknown,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::MeetingBooked => "meeting_booked",
            CallOutcome::NotInterested => "not_interested",
            CallOutcome::CallbackRequested => "callback_requested",
            CallOutcome::BadNumber => "bad_number",
            CallOutcome::VoicemailLeft => "voicemail_left",
            CallOutcome::NoAnswer => "no_answer",
            CallOutcome::TransferredToHuman => "transferred_to_human",
            CallOutcome::Unknown => "unknown",
        }
    }

    /// Lenient parse; unrecognized labels map to `Unknown`
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "meeting_booked" => CallOutcome::MeetingBooked,
            "not_interested" => CallOutcome::NotInterested,
            "callback_requested" => CallOutcome::CallbackRequested,
            "bad_number" => CallOutcome::BadNumber,
            "voicemail_left" => CallOutcome::VoicemailLeft,
            "no_answer" => CallOutcome::NoAnswer,
            "transferred_to_human" => CallOutcome::TransferredToHuman,
            _ => CallOutcome::Unknown,
        }
    }
}

/// Agent configuration consumed by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub primary_goal: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub escalation_policy: String,
    #[serde(default)]
    pub voice_id: String,
    #[serde(default)]
    pub enabled_tools: BTreeSet<String>,
    #[serde(default = "default_max_duration")]
    pub max_call_duration_secs: u64,
    #[serde(default)]
    pub transfer_number: Option<String>,
}

fn default_max_duration() -> u64 {
    DEFAULT_MAX_CALL_DURATION_SECS
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            tenant_id: String::new(),
            agent_name: String::new(),
            company_name: String::new(),
            persona: String::new(),
            primary_goal: String::new(),
            constraints: String::new(),
            escalation_policy: String::new(),
            voice_id: String::new(),
            enabled_tools: BTreeSet::new(),
            max_call_duration_secs: DEFAULT_MAX_CALL_DURATION_SECS,
            transfer_number: None,
        }
    }
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }
}

/// Narrow view of a call row that the runtime reads and updates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub tenant_id: String,
    pub agent_profile_id: String,
    pub contact_phone: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    pub status: CallStatus,
    #[serde(default)]
    pub control_id: Option<String>,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub outcome: Option<CallOutcome>,
    #[serde(default)]
    pub analysis: Option<CallAnalysis>,
}

/// Post-call summary produced after hangup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAnalysis {
    pub summary: String,
    pub outcome: CallOutcome,
    pub sentiment: String,
}
