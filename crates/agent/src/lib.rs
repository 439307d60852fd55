//! Turn orchestration for live calls
//!
//! Features:
//! - Greeting, listen, think, speak loop per call
//! - Tool rounds with a spoken lead-in and a follow-up completion
//! - Two-tier end-of-call detection
//! - Duration and turn limits with fixed farewells
//! - Session building from agent profiles and call records

pub mod end_detection;
pub mod orchestrator;
pub mod outcome;
pub mod phrases;
pub mod session;

pub use end_detection::{detect_end, strip_markers, EndSignal};
pub use orchestrator::{
    max_call_duration, CallEnd, CallIo, EndReason, OrchestratorConfig, OrchestratorDeps,
    OrchestratorState, TurnOrchestrator,
};
pub use outcome::infer_outcome;
pub use session::{build_session, Contact};

use call_agent_persistence::StoreError;
use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Tool error: {0}")]
    Tool(String),
}

impl From<call_agent_pipeline::PipelineError> for AgentError {
    fn from(err: call_agent_pipeline::PipelineError) -> Self {
        AgentError::Pipeline(err.to_string())
    }
}

impl From<call_agent_llm::LlmError> for AgentError {
    fn from(err: call_agent_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<call_agent_tools::ToolError> for AgentError {
    fn from(err: call_agent_tools::ToolError) -> Self {
        AgentError::Tool(err.to_string())
    }
}

impl From<AgentError> for call_agent_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::SessionUnavailable(msg) => call_agent_core::Error::Session(msg),
            AgentError::Store(e) => e.into(),
            AgentError::Llm(msg) => call_agent_core::Error::Llm(msg),
            AgentError::Pipeline(msg) => call_agent_core::Error::Telephony(msg),
            AgentError::Tool(msg) => call_agent_core::Error::Tool(msg),
        }
    }
}
