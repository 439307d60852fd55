//! Core types and traits for the call agent
//!
//! This crate provides foundational types used across all other crates:
//! - μ-law codec and linear resampler
//! - Per-call cancellation signal
//! - Per-call session state and conversation turns
//! - Call record and agent profile types
//! - LLM request/response types and the tagged tool result
//! - Backend traits (STT, TTS, LLM, telephony control, records)
//! - Error types

pub mod audio;
pub mod call;
pub mod cancel;
pub mod codec;
pub mod error;
pub mod llm_types;
pub mod session;
pub mod tool_result;
pub mod traits;

pub use audio::{pcm16_from_le_bytes, pcm16_to_le_bytes, rms_energy, AudioEncoding, SampleRate};
pub use call::{
    AgentProfile, CallAnalysis, CallOutcome, CallRecord, CallStatus,
    DEFAULT_MAX_CALL_DURATION_SECS,
};
pub use cancel::CallCancellation;
pub use codec::{mulaw, resample};
pub use error::{Error, Result};
pub use llm_types::{
    FinishReason, GenerateRequest, GenerateResponse, Message, Role, TokenUsage, ToolCall,
    ToolDefinition,
};
pub use session::{
    CallSession, ConversationTurn, NewTurn, SessionStatus, ToolInvocation, TurnRole,
    CONTEXT_WINDOW_TURNS,
};
pub use tool_result::{ToolErrorKind, ToolResult};

pub use traits::{
    AgentProfileSource, CallRecordStore, DialRequest, LanguageModel, SpeechToText, SttSession,
    TelephonyControl, TextToSpeech,
};
