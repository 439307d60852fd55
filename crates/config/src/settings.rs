//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use call_agent_core::AgentProfile;

use crate::constants::{audio, endpoints, limits, session, timeouts};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation
    #[default]
    Development,
    /// Staging mode
    Staging,
    /// Production mode - credentials required
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub telephony: TelephonyConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Numbers that must never be dialed
    #[serde(default)]
    pub do_not_call: Vec<String>,

    /// Agent profiles served to the runtime
    #[serde(default)]
    pub profiles: Vec<AgentProfile>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public URL the telephony provider reaches us at
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Telephony provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_telephony_api")]
    pub api_base: String,

    #[serde(default)]
    pub api_key: String,

    /// Provider application / connection id used when dialing
    #[serde(default)]
    pub connection_id: String,

    /// Default caller id
    #[serde(default)]
    pub from_number: String,

    #[serde(default = "default_telephony_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_telephony_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub answering_machine_detection: bool,

    #[serde(default = "default_true")]
    pub record_calls: bool,
}

fn default_telephony_api() -> String {
    endpoints::TELEPHONY_API_DEFAULT.to_string()
}

fn default_telephony_timeout() -> u64 {
    timeouts::TELEPHONY_REQUEST_SECS
}

fn default_telephony_connect_timeout() -> u64 {
    timeouts::TELEPHONY_CONNECT_SECS
}

fn default_ring_timeout() -> u64 {
    timeouts::RING_SECS
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_base: default_telephony_api(),
            api_key: String::new(),
            connection_id: String::new(),
            from_number: String::new(),
            request_timeout_secs: default_telephony_timeout(),
            connect_timeout_secs: default_telephony_connect_timeout(),
            ring_timeout_secs: default_ring_timeout(),
            answering_machine_detection: true,
            record_calls: true,
        }
    }
}

/// Speech service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_stt_url")]
    pub stt_url: String,

    /// Recognition model hint
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_stt_timeout")]
    pub stt_timeout_ms: u64,

    /// Silence that closes an utterance
    #[serde(default = "default_silence_ms")]
    pub endpoint_silence_ms: u64,

    /// Normalized RMS energy treated as speech
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,

    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    #[serde(default = "default_voice")]
    pub default_voice: String,

    #[serde(default = "default_tts_timeout")]
    pub tts_timeout_ms: u64,

    #[serde(default = "default_tts_rate")]
    pub tts_sample_rate: u32,
}

fn default_stt_url() -> String {
    endpoints::STT_DEFAULT.to_string()
}

fn default_stt_model() -> String {
    "telephony".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_stt_timeout() -> u64 {
    timeouts::STT_MS
}

fn default_silence_ms() -> u64 {
    audio::ENDPOINT_SILENCE_MS
}

fn default_energy_threshold() -> f32 {
    audio::SPEECH_ENERGY_THRESHOLD
}

fn default_tts_url() -> String {
    endpoints::TTS_DEFAULT.to_string()
}

fn default_voice() -> String {
    "en-US-Journey-D".to_string()
}

fn default_tts_timeout() -> u64 {
    timeouts::TTS_MS
}

fn default_tts_rate() -> u32 {
    audio::TTS_RATE
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: default_stt_url(),
            stt_model: default_stt_model(),
            language: default_language(),
            stt_timeout_ms: default_stt_timeout(),
            endpoint_silence_ms: default_silence_ms(),
            energy_threshold: default_energy_threshold(),
            tts_url: default_tts_url(),
            default_voice: default_voice(),
            tts_timeout_ms: default_tts_timeout(),
            tts_sample_rate: default_tts_rate(),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    endpoints::LLM_DEFAULT.to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.75
}

fn default_max_tokens() -> u32 {
    300
}

fn default_llm_timeout() -> u64 {
    timeouts::LLM_SECS
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Conversation and audio limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    #[serde(default = "default_max_duration")]
    pub max_call_duration_secs: u64,

    #[serde(default = "default_max_duration_tools")]
    pub max_call_duration_with_tools_secs: u64,

    #[serde(default = "default_hangup_grace")]
    pub hangup_grace_ms: u64,

    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer_chunks: usize,

    #[serde(default = "default_backlog_warn")]
    pub outbound_backlog_warn: usize,
}

fn default_max_turns() -> u32 {
    limits::MAX_TURNS
}

fn default_max_duration() -> u64 {
    limits::MAX_CALL_DURATION_SECS
}

fn default_max_duration_tools() -> u64 {
    limits::MAX_CALL_DURATION_WITH_TOOLS_SECS
}

fn default_hangup_grace() -> u64 {
    limits::HANGUP_GRACE_MS
}

fn default_context_turns() -> usize {
    limits::CONTEXT_TURNS
}

fn default_tool_timeout() -> u64 {
    timeouts::TOOL_SECS
}

fn default_outbound_buffer() -> usize {
    audio::OUTBOUND_BUFFER_CHUNKS
}

fn default_backlog_warn() -> usize {
    audio::OUTBOUND_BACKLOG_WARN
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_call_duration_secs: default_max_duration(),
            max_call_duration_with_tools_secs: default_max_duration_tools(),
            hangup_grace_ms: default_hangup_grace(),
            context_turns: default_context_turns(),
            tool_timeout_secs: default_tool_timeout(),
            outbound_buffer_chunks: default_outbound_buffer(),
            outbound_backlog_warn: default_backlog_warn(),
        }
    }
}

/// Session store lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_control_ttl")]
    pub control_id_ttl_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_session_ttl() -> u64 {
    session::TTL_SECS
}

fn default_control_ttl() -> u64 {
    session::CONTROL_ID_TTL_SECS
}

fn default_cleanup_interval() -> u64 {
    session::CLEANUP_INTERVAL_SECS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            control_id_ttl_secs: default_control_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

/// Built-in tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_calendar_api")]
    pub calendar_api_url: String,

    /// Without a key, booking falls back to sharing the scheduling link
    #[serde(default)]
    pub calendar_api_key: Option<String>,

    #[serde(default)]
    pub scheduling_link: String,

    /// Destination for the `send_webhook` tool
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    /// Fallback number for `transfer_call` when the profile has none
    #[serde(default)]
    pub transfer_number: Option<String>,
}

fn default_calendar_api() -> String {
    endpoints::CALENDAR_API_DEFAULT.to_string()
}

fn default_webhook_timeout() -> u64 {
    timeouts::WEBHOOK_SECS
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            calendar_api_url: default_calendar_api(),
            calendar_api_key: None,
            scheduling_link: String::new(),
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout(),
            transfer_number: None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Websocket base derived from the public URL (`http` -> `ws`)
    pub fn websocket_base(&self) -> String {
        let base = self.server.public_base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        }
    }

    /// Media relay URL for one call
    pub fn media_stream_url(&self, call_id: &str) -> String {
        format!("{}/ws/calls/{}", self.websocket_base(), call_id)
    }

    /// Webhook URL handed to the telephony provider
    pub fn webhook_url(&self) -> String {
        format!(
            "{}/webhooks/telephony",
            self.server.public_base_url.trim_end_matches('/')
        )
    }

    /// Look up a configured profile
    pub fn profile(&self, id: &str) -> Option<&AgentProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_limits()?;
        self.validate_session()?;

        if self.environment.is_production() {
            if self.telephony.api_key.is_empty() {
                return Err(ConfigError::MissingField("telephony.api_key".to_string()));
            }
            if self.llm.api_key.is_empty() {
                return Err(ConfigError::MissingField("llm.api_key".to_string()));
            }
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port must be non-zero".to_string(),
            });
        }
        let base = &self.server.public_base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "server.public_base_url".to_string(),
                message: format!("Must be an http(s) URL, got {}", base),
            });
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "Must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn validate_limits(&self) -> Result<(), ConfigError> {
        let l = &self.limits;
        if l.max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_turns".to_string(),
                message: "Must be positive".to_string(),
            });
        }
        if l.max_call_duration_with_tools_secs < l.max_call_duration_secs {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_call_duration_with_tools_secs".to_string(),
                message: format!(
                    "Must be at least max_call_duration_secs ({})",
                    l.max_call_duration_secs
                ),
            });
        }
        if l.context_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.context_turns".to_string(),
                message: "Must be positive".to_string(),
            });
        }
        if l.outbound_buffer_chunks == 0 || l.outbound_backlog_warn > l.outbound_buffer_chunks {
            return Err(ConfigError::InvalidValue {
                field: "limits.outbound_backlog_warn".to_string(),
                message: format!(
                    "Must not exceed outbound_buffer_chunks ({})",
                    l.outbound_buffer_chunks
                ),
            });
        }
        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        if self.session.control_id_ttl_secs < self.session.ttl_secs {
            return Err(ConfigError::InvalidValue {
                field: "session.control_id_ttl_secs".to_string(),
                message: format!(
                    "Must outlive the session TTL ({}s)",
                    self.session.ttl_secs
                ),
            });
        }
        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority: env vars > config/{env} > config/default > defaults.
/// Environment variables use the `CALL_AGENT` prefix with `__` as the
/// section separator, e.g. `CALL_AGENT__LLM__API_KEY`.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.limits.max_turns, 100);
        assert_eq!(settings.limits.max_call_duration_secs, 600);
        assert_eq!(settings.limits.max_call_duration_with_tools_secs, 900);
        assert_eq!(settings.session.ttl_secs, 3600);
        assert_eq!(settings.session.control_id_ttl_secs, 7200);
        assert!((settings.llm.temperature - 0.75).abs() < f32::EPSILON);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_websocket_base() {
        let mut settings = Settings::default();
        settings.server.public_base_url = "https://calls.example.com/".to_string();
        assert_eq!(settings.websocket_base(), "wss://calls.example.com");
        assert_eq!(
            settings.media_stream_url("abc"),
            "wss://calls.example.com/ws/calls/abc"
        );
        assert_eq!(
            settings.webhook_url(),
            "https://calls.example.com/webhooks/telephony"
        );

        settings.server.public_base_url = "http://localhost:8080".to_string();
        assert_eq!(settings.websocket_base(), "ws://localhost:8080");
    }

    #[test]
    fn test_limits_validation() {
        let mut settings = Settings::default();
        settings.limits.max_call_duration_with_tools_secs = 300;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.limits.outbound_backlog_warn = settings.limits.outbound_buffer_chunks + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_session_ttl_validation() {
        let mut settings = Settings::default();
        settings.session.control_id_ttl_secs = 60;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_production_requires_credentials() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        assert!(matches!(settings.validate(), Err(ConfigError::MissingField(_))));

        settings.telephony.api_key = "key".to_string();
        settings.llm.api_key = "key".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_yaml_profiles() {
        let yaml = r#"
server:
  port: 9000
profiles:
  - id: sdr
    tenant_id: acme
    agent_name: Ava
    enabled_tools: [book_meeting, end_call]
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.server.port, 9000);
        let profile = settings.profile("sdr").unwrap();
        assert_eq!(profile.agent_name, "Ava");
        assert!(profile.enabled_tools.contains("book_meeting"));
        assert_eq!(profile.max_call_duration_secs, 600);
        assert!(settings.profile("missing").is_none());
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let yaml = include_str!("../../../config/default.yaml");
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.limits.context_turns, 20);
        assert!(settings.profile("demo").is_some());
    }
}
