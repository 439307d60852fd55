//! Language model integration
//!
//! Features:
//! - OpenAI-compatible chat completions with function tools
//! - Retry with exponential backoff for transient failures
//! - System prompt construction from agent profiles

pub mod backend;
pub mod prompt;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use prompt::{SystemPromptBuilder, END_CALL_MARKER};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for call_agent_core::Error {
    fn from(err: LlmError) -> Self {
        call_agent_core::Error::Llm(err.to_string())
    }
}
