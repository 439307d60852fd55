//! Outbound dialer
//!
//! POST /api/calls      place an outbound call
//! GET  /api/calls/:id  read a call record
//!
//! Placing a call creates the record and the live session, then dials in the
//! background; the conversation itself starts from the answered webhook.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use call_agent_agent::{build_session, Contact};
use call_agent_core::{AgentProfileSource, CallRecord, CallRecordStore, CallStatus, DialRequest};
use call_agent_persistence::SessionStore;

use crate::state::AppState;
use crate::ServerError;

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+\d{10,15}$").unwrap());

/// Numbers that must never be dialed
#[derive(Debug, Default)]
pub struct DoNotCallList {
    numbers: HashSet<String>,
}

impl DoNotCallList {
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            numbers: numbers
                .into_iter()
                .map(|n| normalize(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, number: &str) -> bool {
        self.numbers.contains(&normalize(number))
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

/// Digits only, so `+1 (555) 000-9999` matches `+15550009999`
fn normalize(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceCallRequest {
    pub agent_id: String,
    pub to_number: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_metadata: Option<HashMap<String, Value>>,
}

/// Place an outbound call
pub async fn place_call(
    State(state): State<AppState>,
    Json(request): Json<PlaceCallRequest>,
) -> Result<(StatusCode, Json<CallRecord>), ServerError> {
    let record = create_call(&state, request).await?;

    let dial_state = state.clone();
    let call_id = record.call_id.clone();
    let to = record.contact_phone.clone();
    tokio::spawn(async move {
        if let Err(e) = dial_call(&dial_state, &call_id, &to).await {
            tracing::error!(call_id = %call_id, error = %e, "Outbound dial failed");
        }
    });

    Ok((StatusCode::CREATED, Json(record)))
}

/// Read a call record
pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<CallRecord>, ServerError> {
    state
        .deps
        .records
        .get(&call_id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("call {}", call_id)))
}

/// Validate the request, then create the pending record and its session
pub async fn create_call(
    state: &AppState,
    request: PlaceCallRequest,
) -> Result<CallRecord, ServerError> {
    let to = request.to_number.trim().to_string();
    if !E164.is_match(&to) {
        return Err(ServerError::InvalidRequest(format!(
            "to_number must be E.164 (+ followed by 10-15 digits), got {}",
            to
        )));
    }

    let profile = state
        .deps
        .profiles
        .get_profile(&request.agent_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("agent {}", request.agent_id)))?;

    if state.do_not_call.contains(&to) {
        metrics::counter!("call_dnc_blocked_total").increment(1);
        return Err(ServerError::DoNotCall(to));
    }

    let call_id = Uuid::new_v4().to_string();
    let record = CallRecord {
        call_id: call_id.clone(),
        tenant_id: profile.tenant_id.clone(),
        agent_profile_id: profile.id.clone(),
        contact_phone: to.clone(),
        contact_name: request.contact_name.clone(),
        status: CallStatus::Pending,
        ..Default::default()
    };
    state.deps.records.upsert(record.clone()).await?;

    let mut contact =
        Contact::new(&to).with_metadata(request.contact_metadata.unwrap_or_default());
    if let Some(name) = request.contact_name {
        contact = contact.with_name(name);
    }
    let session = build_session(
        &call_id,
        &profile,
        &contact,
        &state.settings.speech.default_voice,
    );
    state.deps.sessions.create(session).await?;

    tracing::info!(call_id = %call_id, agent = %profile.id, "Outbound call created");
    Ok(record)
}

/// Dial a created call and remember its control id
///
/// A rejected dial marks the call failed and drops its session.
pub async fn dial_call(state: &AppState, call_id: &str, to: &str) -> Result<String, ServerError> {
    let request = DialRequest {
        call_id: call_id.to_string(),
        to: to.to_string(),
        from: None,
    };

    match state.deps.telephony.dial(&request).await {
        Ok(control_id) => {
            state.deps.records.set_control_id(call_id, &control_id).await?;
            state.deps.sessions.map_control_id(&control_id, call_id).await?;
            metrics::counter!("calls_dialed_total").increment(1);
            Ok(control_id)
        }
        Err(e) => {
            metrics::counter!("call_dial_failures_total").increment(1);
            state.deps.records.set_status(call_id, CallStatus::Failed).await?;
            state.deps.sessions.delete(call_id).await?;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_state, fakes, MockTelephony};

    fn request(to: &str) -> PlaceCallRequest {
        PlaceCallRequest {
            agent_id: "p1".to_string(),
            to_number: to.to_string(),
            contact_name: Some("Dana".to_string()),
            contact_metadata: None,
        }
    }

    #[test]
    fn test_dnc_normalization() {
        let list = DoNotCallList::new(["+1 (555) 000-9999"]);
        assert!(list.contains("+15550009999"));
        assert!(!list.contains("+15550001111"));
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_create_call_builds_record_and_session() {
        let f = fakes(MockTelephony::default());
        let state = app_state(&f);

        let record = create_call(&state, request("+15550001111")).await.unwrap();
        assert_eq!(record.status, CallStatus::Pending);
        assert_eq!(record.tenant_id, "t1");

        let session = f.sessions.get(&record.call_id).await.unwrap().unwrap();
        assert_eq!(session.contact_phone, "+15550001111");
        assert!(session.system_prompt.contains("Dana"));
    }

    #[tokio::test]
    async fn test_invalid_number_rejected() {
        let f = fakes(MockTelephony::default());
        let state = app_state(&f);

        for bad in ["5550001111", "+1555", "+1555000111122223", "+1555abc1111"] {
            let err = create_call(&state, request(bad)).await.unwrap_err();
            assert!(matches!(err, ServerError::InvalidRequest(_)), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let f = fakes(MockTelephony::default());
        let state = app_state(&f);

        let mut req = request("+15550001111");
        req.agent_id = "missing".to_string();
        let err = create_call(&state, req).await.unwrap_err();
        assert_eq!(StatusCode::from(&err), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_do_not_call_number_rejected() {
        let f = fakes(MockTelephony::default());
        let state = app_state(&f);

        let err = create_call(&state, request("+15550009999")).await.unwrap_err();
        assert_eq!(StatusCode::from(&err), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.to_string(),
            "Number +15550009999 is on the Do Not Call list"
        );
        assert!(f.telephony.commands().is_empty());
    }

    #[tokio::test]
    async fn test_dial_maps_control_id() {
        let f = fakes(MockTelephony::default());
        let state = app_state(&f);
        let record = create_call(&state, request("+15550001111")).await.unwrap();

        let control_id = dial_call(&state, &record.call_id, "+15550001111")
            .await
            .unwrap();

        let stored = f.records.get(&record.call_id).await.unwrap().unwrap();
        assert_eq!(stored.control_id.as_deref(), Some(control_id.as_str()));
        assert_eq!(
            f.sessions.resolve_control_id(&control_id).await.unwrap(),
            Some(record.call_id.clone())
        );
    }

    #[tokio::test]
    async fn test_failed_dial_marks_call_failed() {
        let f = fakes(MockTelephony {
            fail_dial: true,
            ..Default::default()
        });
        let state = app_state(&f);
        let record = create_call(&state, request("+15550001111")).await.unwrap();

        let err = dial_call(&state, &record.call_id, "+15550001111")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Upstream(_)));

        let stored = f.records.get(&record.call_id).await.unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Failed);
        assert!(f.sessions.get(&record.call_id).await.unwrap().is_none());
    }
}
