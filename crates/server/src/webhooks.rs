//! Telephony webhook route
//!
//! POST /webhooks/telephony
//!
//! The provider retries anything that is not a 2xx, so every delivery is
//! answered with 200 and handler failures are only logged.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Signaling event kinds the lifecycle reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Initiated,
    Answered,
    Hangup,
    MachineDetected,
    StreamingStarted,
    StreamingStopped,
    Bridged,
    RecordingAvailable,
    Other(String),
}

impl EventKind {
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "call.initiated" => EventKind::Initiated,
            "call.answered" => EventKind::Answered,
            "call.hangup" => EventKind::Hangup,
            "call.machine.detection.ended" => EventKind::MachineDetected,
            "streaming.started" => EventKind::StreamingStarted,
            "streaming.stopped" => EventKind::StreamingStopped,
            "call.bridged" => EventKind::Bridged,
            "recording.saved" => EventKind::RecordingAvailable,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Initiated => "initiated",
            EventKind::Answered => "answered",
            EventKind::Hangup => "hangup",
            EventKind::MachineDetected => "machine_detected",
            EventKind::StreamingStarted => "streaming_started",
            EventKind::StreamingStopped => "streaming_stopped",
            EventKind::Bridged => "bridged",
            EventKind::RecordingAvailable => "recording_available",
            EventKind::Other(name) => name,
        }
    }
}

/// One parsed signaling event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelephonyEvent {
    /// Provider event id, used to drop redelivered events
    pub id: Option<String>,
    pub kind: EventKind,
    pub control_id: Option<String>,
    pub client_state: Option<String>,
    /// Answering machine detection result
    pub result: Option<String>,
    pub hangup_cause: Option<String>,
    pub recording_url: Option<String>,
}

impl TelephonyEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: None,
            kind,
            control_id: None,
            client_state: None,
            result: None,
            hangup_cause: None,
            recording_url: None,
        }
    }

    pub fn with_control_id(mut self, control_id: impl Into<String>) -> Self {
        self.control_id = Some(control_id.into());
        self
    }

    pub fn with_client_state(mut self, state: impl Into<String>) -> Self {
        self.client_state = Some(state.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_recording_url(mut self, url: impl Into<String>) -> Self {
        self.recording_url = Some(url.into());
        self
    }

    /// Parse the provider envelope `{data: {event_type, id, payload}}`
    pub fn parse(body: &[u8]) -> Option<Self> {
        let envelope: Envelope = serde_json::from_slice(body).ok()?;
        let data = envelope.data?;
        let event_type = data.event_type.filter(|t| !t.is_empty())?;
        let payload = data.payload.unwrap_or_default();

        Some(Self {
            id: data.id,
            kind: EventKind::from_event_type(&event_type),
            control_id: payload.call_control_id.filter(|c| !c.is_empty()),
            client_state: payload.client_state.filter(|c| !c.is_empty()),
            result: payload.result,
            hangup_cause: payload.hangup_cause,
            recording_url: payload
                .recording_urls
                .as_ref()
                .and_then(|urls| urls.get("mp3"))
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    payload: Option<EventPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct EventPayload {
    #[serde(default)]
    call_control_id: Option<String>,
    #[serde(default)]
    client_state: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    hangup_cause: Option<String>,
    #[serde(default)]
    recording_urls: Option<Value>,
}

/// Receive a signaling event
pub async fn handle_telephony_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let Some(event) = TelephonyEvent::parse(&body) else {
        tracing::warn!(bytes = body.len(), "Unparseable telephony webhook");
        return (StatusCode::OK, Json(json!({ "status": "ok" })));
    };

    metrics::counter!("call_webhook_events_total", "event" => event.kind.as_str().to_string())
        .increment(1);
    tracing::info!(
        event = event.kind.as_str(),
        control_id = event.control_id.as_deref().unwrap_or(""),
        "Telephony event"
    );

    if let Err(e) = state.lifecycle.handle(event.clone()).await {
        tracing::error!(event = event.kind.as_str(), error = %e, "Webhook handler failed");
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answered() {
        let body = br#"{
            "data": {
                "id": "evt-1",
                "event_type": "call.answered",
                "payload": {"call_control_id": "v3:abc", "client_state": "YzE="}
            }
        }"#;
        let event = TelephonyEvent::parse(body).unwrap();
        assert_eq!(event.kind, EventKind::Answered);
        assert_eq!(event.id.as_deref(), Some("evt-1"));
        assert_eq!(event.control_id.as_deref(), Some("v3:abc"));
        assert_eq!(event.client_state.as_deref(), Some("YzE="));
    }

    #[test]
    fn test_parse_recording_and_machine_result() {
        let body = br#"{"data": {"event_type": "recording.saved",
            "payload": {"call_control_id": "c", "recording_urls": {"mp3": "https://rec/1.mp3"}}}}"#;
        let event = TelephonyEvent::parse(body).unwrap();
        assert_eq!(event.kind, EventKind::RecordingAvailable);
        assert_eq!(event.recording_url.as_deref(), Some("https://rec/1.mp3"));

        let body = br#"{"data": {"event_type": "call.machine.detection.ended",
            "payload": {"call_control_id": "c", "result": "machine"}}}"#;
        let event = TelephonyEvent::parse(body).unwrap();
        assert_eq!(event.kind, EventKind::MachineDetected);
        assert_eq!(event.result.as_deref(), Some("machine"));
    }

    #[test]
    fn test_unknown_event_type_kept() {
        let body = br#"{"data": {"event_type": "call.dtmf.received", "payload": {}}}"#;
        let event = TelephonyEvent::parse(body).unwrap();
        assert_eq!(event.kind, EventKind::Other("call.dtmf.received".to_string()));
        assert!(event.control_id.is_none());
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(TelephonyEvent::parse(b"not json").is_none());
        assert!(TelephonyEvent::parse(b"{}").is_none());
        assert!(TelephonyEvent::parse(br#"{"data": {"payload": {}}}"#).is_none());
    }
}
