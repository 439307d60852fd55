//! Per-call conversation state
//!
//! A [`CallSession`] is the working state of one live call. It is owned by the
//! session store and mutated only through the explicit methods below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use crate::tool_result::ToolResult;

/// Number of most recent turns handed to the language model
pub const CONTEXT_WINDOW_TURNS: usize = 20;

/// Runtime status of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Greeting,
    Listening,
    Processing,
    Speaking,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Greeting => "greeting",
            SessionStatus::Listening => "listening",
            SessionStatus::Processing => "processing",
            SessionStatus::Speaking => "speaking",
            SessionStatus::Ended => "ended",
        }
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Agent => "agent",
            TurnRole::System => "system",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call requested by the model and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: HashMap<String, Value>,
    pub result: ToolResult,
}

/// One entry in the transcript of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub turn_index: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<HashMap<String, ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// A turn before the store assigns its index
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub role: TurnRole,
    pub content: String,
    pub tool_calls: Option<Vec<ToolInvocation>>,
    pub tool_results: Option<HashMap<String, ToolResult>>,
    pub latency_ms: Option<u64>,
}

impl NewTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
            latency_ms: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Agent, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolInvocation>) -> Self {
        if !calls.is_empty() {
            let results = calls
                .iter()
                .map(|c| (c.name.clone(), c.result.clone()))
                .collect();
            self.tool_results = Some(results);
            self.tool_calls = Some(calls);
        }
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Working state of one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub call_id: String,
    pub tenant_id: String,
    pub agent_profile_id: String,
    pub contact_phone: String,
    pub system_prompt: String,
    pub voice_id: String,
    pub enabled_tools: BTreeSet<String>,
    status: SessionStatus,
    is_agent_speaking: bool,
    turn_count: u32,
    conversation_history: Vec<ConversationTurn>,
    tool_results_pending: HashMap<String, ToolResult>,
    pub contact_metadata: HashMap<String, Value>,
    pub call_start_time: DateTime<Utc>,
}

impl CallSession {
    pub fn new(
        call_id: impl Into<String>,
        tenant_id: impl Into<String>,
        agent_profile_id: impl Into<String>,
        contact_phone: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tenant_id: tenant_id.into(),
            agent_profile_id: agent_profile_id.into(),
            contact_phone: contact_phone.into(),
            system_prompt: String::new(),
            voice_id: String::new(),
            enabled_tools: BTreeSet::new(),
            status: SessionStatus::Greeting,
            is_agent_speaking: false,
            turn_count: 0,
            conversation_history: Vec::new(),
            tool_results_pending: HashMap::new(),
            contact_metadata: HashMap::new(),
            call_start_time: Utc::now(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_contact_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.contact_metadata = metadata;
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    pub fn is_agent_speaking(&self) -> bool {
        self.is_agent_speaking
    }

    pub fn set_speaking(&mut self, speaking: bool) {
        self.is_agent_speaking = speaking;
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// Append a turn, assigning the next index
    pub fn append_turn(&mut self, turn: NewTurn) -> u32 {
        let index = self.turn_count;
        self.conversation_history.push(ConversationTurn {
            role: turn.role,
            content: turn.content,
            turn_index: index,
            timestamp: Utc::now(),
            tool_calls: turn.tool_calls,
            tool_results: turn.tool_results,
            latency_ms: turn.latency_ms,
        });
        self.turn_count += 1;
        index
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.conversation_history
    }

    /// The most recent `n` turns, oldest first
    pub fn context_window(&self, n: usize) -> &[ConversationTurn] {
        let start = self.conversation_history.len().saturating_sub(n);
        &self.conversation_history[start..]
    }

    pub fn pending_tool_results(&self) -> &HashMap<String, ToolResult> {
        &self.tool_results_pending
    }

    pub fn set_pending_tool_results(&mut self, results: HashMap<String, ToolResult>) {
        self.tool_results_pending = results;
    }

    pub fn clear_pending_tool_results(&mut self) {
        self.tool_results_pending.clear();
    }

    pub fn tools_enabled(&self) -> bool {
        !self.enabled_tools.is_empty()
    }

    /// Seconds since the call started
    pub fn elapsed_secs(&self) -> u64 {
        (Utc::now() - self.call_start_time).num_seconds().max(0) as u64
    }

    /// Time since the call started; zero if the start lies in the future
    pub fn elapsed(&self) -> std::time::Duration {
        (Utc::now() - self.call_start_time)
            .to_std()
            .unwrap_or_default()
    }

    /// Render the log as `[ROLE]: content` lines
    pub fn transcript(&self) -> String {
        self.conversation_history
            .iter()
            .map(|t| format!("[{}]: {}", t.role.as_str().to_uppercase(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
