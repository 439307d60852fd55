//! Tools the agent can invoke mid-call
//!
//! A [`ToolRegistry`] is built once at startup and shared by every call; the
//! [`ToolDispatcher`] runs a model turn's calls concurrently with per-tool
//! timeouts and folds every failure into a tagged [`ToolResult`].
//!
//! [`ToolResult`]: call_agent_core::ToolResult

pub mod builtin;
pub mod registry;
pub mod tool;

pub use builtin::{
    create_registry, BookMeetingTool, EndCallTool, LookupContactTool, SendWebhookTool,
    TransferCallTool,
};
pub use registry::{ToolDispatcher, ToolRegistry, DEFAULT_TOOL_TIMEOUT_SECS};
pub use tool::{ObjectSchema, Tool, ToolArgs, ToolContext};

/// Name of the tool that ends the call
pub const END_CALL_TOOL: &str = "end_call";

use call_agent_core::ToolErrorKind;
use thiserror::Error;

/// Tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        ToolError::InvalidParams(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        ToolError::Unavailable(msg.into())
    }

    pub fn execution_failed(msg: impl Into<String>) -> Self {
        ToolError::ExecutionFailed(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ToolError::Internal(msg.into())
    }

    /// Kind recorded on the tool result
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::InvalidParams(_) => ToolErrorKind::InvalidArguments,
            ToolError::Unavailable(_) => ToolErrorKind::Unavailable,
            ToolError::ExecutionFailed(_) | ToolError::Internal(_) => ToolErrorKind::Failed,
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ToolError::Unavailable(err.to_string())
        } else {
            ToolError::ExecutionFailed(err.to_string())
        }
    }
}

impl From<ToolError> for call_agent_core::Error {
    fn from(err: ToolError) -> Self {
        call_agent_core::Error::Tool(err.to_string())
    }
}
