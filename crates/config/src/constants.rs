//! Centralized defaults for the call agent
//!
//! Service endpoints, timeouts and runtime limits used as settings defaults.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Call-control REST API
    pub const TELEPHONY_API_DEFAULT: &str = "https://api.telnyx.com/v2";

    /// OpenAI-compatible completion endpoint
    pub const LLM_DEFAULT: &str = "https://api.openai.com/v1";

    /// Speech-to-text sidecar
    pub const STT_DEFAULT: &str = "http://127.0.0.1:8090";

    /// Text-to-speech sidecar
    pub const TTS_DEFAULT: &str = "http://127.0.0.1:8091";

    /// Scheduling API
    pub const CALENDAR_API_DEFAULT: &str = "https://api.calendly.com";
}

/// Timeouts for outbound calls (seconds unless noted)
pub mod timeouts {
    /// Call-control request timeout
    pub const TELEPHONY_REQUEST_SECS: u64 = 30;

    /// Call-control connect timeout
    pub const TELEPHONY_CONNECT_SECS: u64 = 10;

    /// Ring time before an outbound call counts as unanswered
    pub const RING_SECS: u64 = 30;

    /// Completion request timeout
    pub const LLM_SECS: u64 = 15;

    /// Transcription request timeout (ms)
    pub const STT_MS: u64 = 10_000;

    /// Synthesis request timeout (ms)
    pub const TTS_MS: u64 = 10_000;

    /// Default per-tool timeout
    pub const TOOL_SECS: u64 = 10;

    /// Outbound webhook tool timeout
    pub const WEBHOOK_SECS: u64 = 10;
}

/// Conversation limits
pub mod limits {
    /// Maximum turns before a graceful wrap-up
    pub const MAX_TURNS: u32 = 100;

    /// Maximum call duration without tools
    pub const MAX_CALL_DURATION_SECS: u64 = 600;

    /// Maximum call duration when tools are enabled
    pub const MAX_CALL_DURATION_WITH_TOOLS_SECS: u64 = 900;

    /// Wait after the farewell before hanging up (ms)
    pub const HANGUP_GRACE_MS: u64 = 2000;

    /// Turns handed to the model as context
    pub const CONTEXT_TURNS: usize = 20;
}

/// Session store lifetimes
pub mod session {
    /// Session TTL, refreshed on every mutation
    pub const TTL_SECS: u64 = 3600;

    /// Control-id to call-id mapping TTL
    pub const CONTROL_ID_TTL_SECS: u64 = 7200;

    /// Expired-entry sweep interval
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;
}

/// Audio path
pub mod audio {
    /// Telephony leg sample rate
    pub const TELEPHONY_RATE: u32 = 8000;

    /// STT input sample rate
    pub const STT_RATE: u32 = 16000;

    /// TTS output sample rate
    pub const TTS_RATE: u32 = 24000;

    /// Outbound chunk queue capacity
    pub const OUTBOUND_BUFFER_CHUNKS: usize = 64;

    /// Queued chunks above which the call is flagged unhealthy
    pub const OUTBOUND_BACKLOG_WARN: usize = 48;

    /// Silence that closes an utterance (ms)
    pub const ENDPOINT_SILENCE_MS: u64 = 700;

    /// Normalized RMS energy treated as speech
    pub const SPEECH_ENERGY_THRESHOLD: f32 = 0.01;
}
