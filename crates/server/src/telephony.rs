//! Call-control REST client
//!
//! Commands are `POST {api}/calls/{control_id}/actions/{action}`; dialing is
//! `POST {api}/calls`. Our call id rides along as base64 `client_state` so
//! webhooks can be matched back to it.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use call_agent_config::Settings;
use call_agent_core::{DialRequest, TelephonyControl};

/// Telephony errors
#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for TelephonyError {
    fn from(err: reqwest::Error) -> Self {
        TelephonyError::Network(err.to_string())
    }
}

impl From<TelephonyError> for call_agent_core::Error {
    fn from(err: TelephonyError) -> Self {
        call_agent_core::Error::Telephony(err.to_string())
    }
}

/// Encode a call id for `client_state`
pub fn encode_client_state(call_id: &str) -> String {
    BASE64.encode(call_id.as_bytes())
}

/// Decode `client_state` back to a call id
pub fn decode_client_state(state: &str) -> Option<String> {
    if state.is_empty() {
        return None;
    }
    let bytes = BASE64.decode(state.trim()).ok()?;
    String::from_utf8(bytes).ok().filter(|id| !id.is_empty())
}

#[derive(Debug, Clone)]
pub struct CallControlConfig {
    pub api_base: String,
    pub api_key: String,
    pub connection_id: String,
    pub from_number: String,
    pub webhook_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub ring_timeout_secs: u64,
    pub answering_machine_detection: bool,
    pub record_calls: bool,
}

impl CallControlConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let t = &settings.telephony;
        Self {
            api_base: t.api_base.trim_end_matches('/').to_string(),
            api_key: t.api_key.clone(),
            connection_id: t.connection_id.clone(),
            from_number: t.from_number.clone(),
            webhook_url: settings.webhook_url(),
            request_timeout: Duration::from_secs(t.request_timeout_secs),
            connect_timeout: Duration::from_secs(t.connect_timeout_secs),
            ring_timeout_secs: t.ring_timeout_secs,
            answering_machine_detection: t.answering_machine_detection,
            record_calls: t.record_calls,
        }
    }
}

/// Body for `POST /calls`
pub fn dial_payload(config: &CallControlConfig, request: &DialRequest) -> Value {
    let from = request
        .from
        .clone()
        .unwrap_or_else(|| config.from_number.clone());
    let mut payload = json!({
        "connection_id": config.connection_id,
        "to": request.to,
        "from": from,
        "webhook_url": config.webhook_url,
        "webhook_url_method": "POST",
        "client_state": encode_client_state(&request.call_id),
        "timeout_secs": config.ring_timeout_secs,
    });
    if config.answering_machine_detection {
        payload["answering_machine_detection"] = json!("detect_beep");
    }
    if config.record_calls {
        payload["record"] = json!("record-from-answer");
    }
    payload
}

/// Body for the `streaming_start` action
pub fn streaming_payload(stream_url: &str, inbound_track_only: bool) -> Value {
    json!({
        "stream_url": stream_url,
        "stream_track": if inbound_track_only { "inbound_track" } else { "both_tracks" },
        "enable_dialogflow": false,
    })
}

pub struct CallControlClient {
    client: Client,
    config: CallControlConfig,
}

impl CallControlClient {
    pub fn new(config: CallControlConfig) -> Result<Self, TelephonyError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TelephonyError::Configuration(e.to_string()))?;

        if config.api_key.is_empty() {
            tracing::warn!("Telephony API key is empty, call-control requests will be rejected");
        }

        Ok(Self { client, config })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TelephonyError> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            metrics::counter!("call_telephony_errors_total").increment(1);
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TelephonyError::InvalidResponse(e.to_string()))
    }

    async fn command(
        &self,
        control_id: &str,
        action: &str,
        body: Value,
    ) -> Result<(), TelephonyError> {
        self.post(&format!("/calls/{}/actions/{}", control_id, action), body)
            .await?;
        tracing::debug!(control_id, action, "Call-control command accepted");
        Ok(())
    }
}

#[async_trait]
impl TelephonyControl for CallControlClient {
    async fn dial(&self, request: &DialRequest) -> call_agent_core::Result<String> {
        let response = self
            .post("/calls", dial_payload(&self.config, request))
            .await?;
        let control_id = response
            .pointer("/data/call_control_id")
            .and_then(Value::as_str)
            .ok_or_else(|| TelephonyError::InvalidResponse("missing call_control_id".to_string()))?;

        tracing::info!(call_id = %request.call_id, control_id, "Outbound call created");
        Ok(control_id.to_string())
    }

    async fn answer(&self, control_id: &str, call_id: &str) -> call_agent_core::Result<()> {
        self.command(
            control_id,
            "answer",
            json!({ "client_state": encode_client_state(call_id) }),
        )
        .await?;
        Ok(())
    }

    async fn start_media_relay(
        &self,
        control_id: &str,
        stream_url: &str,
        inbound_track_only: bool,
    ) -> call_agent_core::Result<()> {
        self.command(
            control_id,
            "streaming_start",
            streaming_payload(stream_url, inbound_track_only),
        )
        .await?;
        Ok(())
    }

    async fn stop_media_relay(&self, control_id: &str) -> call_agent_core::Result<()> {
        self.command(control_id, "streaming_stop", json!({})).await?;
        Ok(())
    }

    async fn hangup(&self, control_id: &str) -> call_agent_core::Result<()> {
        self.command(control_id, "hangup", json!({})).await?;
        Ok(())
    }

    async fn transfer(&self, control_id: &str, to: &str) -> call_agent_core::Result<()> {
        self.command(control_id, "transfer", json!({ "to": to })).await?;
        Ok(())
    }

    async fn send_dtmf(&self, control_id: &str, digits: &str) -> call_agent_core::Result<()> {
        self.command(control_id, "send_dtmf", json!({ "digits": digits }))
            .await?;
        Ok(())
    }

    async fn play_audio(&self, control_id: &str, audio_url: &str) -> call_agent_core::Result<()> {
        self.command(control_id, "playback_start", json!({ "audio_url": audio_url }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CallControlConfig {
        CallControlConfig::from_settings(&Settings::default())
    }

    #[test]
    fn test_client_state_round_trip() {
        let encoded = encode_client_state("3f1c-call");
        assert_eq!(decode_client_state(&encoded).as_deref(), Some("3f1c-call"));
        assert_eq!(decode_client_state(""), None);
        assert_eq!(decode_client_state("%%% not base64"), None);
    }

    #[test]
    fn test_dial_payload() {
        let mut config = config();
        config.from_number = "+15550009999".to_string();
        let request = DialRequest {
            call_id: "c1".to_string(),
            to: "+15550001111".to_string(),
            from: None,
        };

        let payload = dial_payload(&config, &request);
        assert_eq!(payload["to"], "+15550001111");
        assert_eq!(payload["from"], "+15550009999");
        assert_eq!(payload["answering_machine_detection"], "detect_beep");
        assert_eq!(payload["record"], "record-from-answer");
        assert_eq!(payload["timeout_secs"], 30);
        assert_eq!(payload["webhook_url"], "http://localhost:8080/webhooks/telephony");
        assert_eq!(
            decode_client_state(payload["client_state"].as_str().unwrap()).as_deref(),
            Some("c1")
        );
    }

    #[test]
    fn test_dial_payload_without_amd_or_recording() {
        let mut config = config();
        config.answering_machine_detection = false;
        config.record_calls = false;
        let request = DialRequest {
            call_id: "c1".to_string(),
            to: "+15550001111".to_string(),
            from: Some("+15550002222".to_string()),
        };

        let payload = dial_payload(&config, &request);
        assert_eq!(payload["from"], "+15550002222");
        assert!(payload.get("answering_machine_detection").is_none());
        assert!(payload.get("record").is_none());
    }

    #[test]
    fn test_streaming_payload() {
        let payload = streaming_payload("wss://agent.example/ws/calls/c1", true);
        assert_eq!(payload["stream_track"], "inbound_track");
        assert_eq!(payload["stream_url"], "wss://agent.example/ws/calls/c1");
        assert_eq!(streaming_payload("x", false)["stream_track"], "both_tracks");
    }
}
