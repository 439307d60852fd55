//! Call Lifecycle Controller
//!
//! Maps telephony signaling events onto the call record, the session store and
//! the running call runtimes. Events may arrive twice or out of order; each
//! handler checks the record's status before acting, and events carrying a
//! provider id are dropped on redelivery.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use call_agent_agent::OrchestratorDeps;
use call_agent_config::Settings;
use call_agent_core::{
    CallCancellation, CallOutcome, CallRecord, CallRecordStore, CallStatus, LanguageModel,
    SessionStatus, TelephonyControl,
};
use call_agent_persistence::{SessionStore, StoreError};

use crate::analysis::analyze_call;
use crate::telephony::decode_client_state;
use crate::webhooks::{EventKind, TelephonyEvent};
use crate::ServerError;

/// Provider event ids remembered for redelivery checks
const SEEN_EVENT_CAPACITY: usize = 4096;

/// Bounded set of recently processed event ids
struct SeenEvents {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenEvents {
    fn new() -> Self {
        Self {
            order: VecDeque::with_capacity(SEEN_EVENT_CAPACITY),
            ids: HashSet::with_capacity(SEEN_EVENT_CAPACITY),
        }
    }

    /// Returns false if the id was already seen
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= SEEN_EVENT_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

pub struct CallLifecycle {
    settings: Arc<Settings>,
    sessions: Arc<dyn SessionStore>,
    records: Arc<dyn CallRecordStore>,
    telephony: Arc<dyn TelephonyControl>,
    llm: Arc<dyn LanguageModel>,
    active: DashMap<String, CallCancellation>,
    seen: Mutex<SeenEvents>,
}

impl CallLifecycle {
    pub fn new(settings: Arc<Settings>, deps: &OrchestratorDeps) -> Self {
        Self {
            settings,
            sessions: deps.sessions.clone(),
            records: deps.records.clone(),
            telephony: deps.telephony.clone(),
            llm: deps.llm.clone(),
            active: DashMap::new(),
            seen: Mutex::new(SeenEvents::new()),
        }
    }

    /// Track a running call runtime so hangup can stop it
    ///
    /// A runtime already registered for the call is cancelled first.
    pub fn register(&self, call_id: &str, cancel: CallCancellation) {
        if let Some(previous) = self.active.insert(call_id.to_string(), cancel) {
            tracing::warn!(call_id, "Replacing an active runtime for the call");
            previous.cancel();
        }
        self.report_active();
    }

    /// Drop the registration once its runtime has finished
    ///
    /// Only a cancelled handle is removed, so a newer runtime for the same call
    /// stays registered.
    pub fn unregister(&self, call_id: &str) {
        self.active.remove_if(call_id, |_, cancel| cancel.is_cancelled());
        self.report_active();
    }

    pub fn is_active(&self, call_id: &str) -> bool {
        self.active.contains_key(call_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn report_active(&self) {
        metrics::gauge!("call_active_calls").set(self.active.len() as f64);
    }

    /// Apply one signaling event
    pub async fn handle(&self, event: TelephonyEvent) -> Result<(), ServerError> {
        if let Some(id) = event.id.as_deref() {
            if !self.seen.lock().insert(id) {
                tracing::debug!(event_id = id, "Duplicate event dropped");
                return Ok(());
            }
        }

        if let EventKind::Other(name) = &event.kind {
            tracing::debug!(event_type = %name, "Unhandled telephony event");
            return Ok(());
        }

        let Some(call_id) = self.resolve_call_id(&event).await? else {
            tracing::warn!(
                event = event.kind.as_str(),
                control_id = event.control_id.as_deref().unwrap_or(""),
                "Event for unknown call dropped"
            );
            return Ok(());
        };

        match event.kind {
            EventKind::Initiated => self.on_initiated(&call_id, event.control_id.as_deref()).await,
            EventKind::Answered => self.on_answered(&call_id, event.control_id.as_deref()).await,
            EventKind::MachineDetected => {
                self.on_machine_detected(
                    &call_id,
                    event.control_id.as_deref(),
                    event.result.as_deref().unwrap_or(""),
                )
                .await
            }
            EventKind::Hangup => {
                self.on_hangup(&call_id, event.hangup_cause.as_deref().unwrap_or("unknown"))
                    .await
            }
            EventKind::RecordingAvailable => {
                self.on_recording(&call_id, event.recording_url.as_deref()).await
            }
            EventKind::Bridged => self.on_bridged(&call_id).await,
            EventKind::StreamingStarted => {
                tracing::info!(call_id = %call_id, "Media streaming confirmed");
                Ok(())
            }
            EventKind::StreamingStopped => {
                tracing::info!(call_id = %call_id, "Media streaming stopped");
                Ok(())
            }
            EventKind::Other(_) => Ok(()),
        }
    }

    /// Call id from `client_state`, else from the control-id map
    async fn resolve_call_id(&self, event: &TelephonyEvent) -> Result<Option<String>, ServerError> {
        if let Some(call_id) = event.client_state.as_deref().and_then(decode_client_state) {
            return Ok(Some(call_id));
        }
        match event.control_id.as_deref() {
            Some(control_id) => Ok(self.sessions.resolve_control_id(control_id).await?),
            None => Ok(None),
        }
    }

    async fn record(&self, call_id: &str) -> Result<Option<CallRecord>, ServerError> {
        let record = self.records.get(call_id).await?;
        if record.is_none() {
            tracing::warn!(call_id, "No call record for event");
        }
        Ok(record)
    }

    async fn remember_control_id(&self, call_id: &str, control_id: &str) -> Result<(), ServerError> {
        self.sessions.map_control_id(control_id, call_id).await?;
        self.records.set_control_id(call_id, control_id).await?;
        Ok(())
    }

    async fn on_initiated(&self, call_id: &str, control_id: Option<&str>) -> Result<(), ServerError> {
        let Some(record) = self.record(call_id).await? else {
            return Ok(());
        };

        if let Some(control_id) = control_id {
            self.remember_control_id(call_id, control_id).await?;
        }

        if matches!(record.status, CallStatus::Pending | CallStatus::Ringing) {
            self.records.set_status(call_id, CallStatus::Initiated).await?;
            tracing::info!(call_id, "Call initiated");
        }
        Ok(())
    }

    async fn on_answered(&self, call_id: &str, control_id: Option<&str>) -> Result<(), ServerError> {
        let Some(record) = self.record(call_id).await? else {
            return Ok(());
        };
        if record.status == CallStatus::Answered || record.status.is_terminal() {
            tracing::debug!(call_id, status = record.status.as_str(), "Answer already handled");
            return Ok(());
        }

        let Some(control_id) = control_id.map(str::to_string).or(record.control_id) else {
            tracing::error!(call_id, "Answered call has no control id");
            return Ok(());
        };

        self.remember_control_id(call_id, &control_id).await?;
        self.records.mark_answered(call_id, Utc::now()).await?;

        let stream_url = self.settings.media_stream_url(call_id);
        match self
            .telephony
            .start_media_relay(&control_id, &stream_url, true)
            .await
        {
            Ok(()) => {
                metrics::counter!("calls_answered_total").increment(1);
                tracing::info!(call_id, stream_url = %stream_url, "Media relay requested");
            }
            Err(e) => {
                tracing::error!(call_id, error = %e, "Failed to start media relay, hanging up");
                if let Err(e) = self.telephony.hangup(&control_id).await {
                    tracing::warn!(call_id, error = %e, "Hangup after relay failure failed");
                }
            }
        }
        Ok(())
    }

    async fn on_machine_detected(
        &self,
        call_id: &str,
        control_id: Option<&str>,
        result: &str,
    ) -> Result<(), ServerError> {
        if !matches!(result, "machine" | "fax") {
            tracing::info!(call_id, result, "Human answered");
            return Ok(());
        }

        let Some(record) = self.record(call_id).await? else {
            return Ok(());
        };
        if record.status == CallStatus::Voicemail {
            return Ok(());
        }

        tracing::info!(call_id, result, "Answering machine detected");
        self.records.set_status(call_id, CallStatus::Voicemail).await?;
        self.records
            .set_outcome(call_id, CallOutcome::VoicemailLeft)
            .await?;

        match self.sessions.set_status(call_id, SessionStatus::Ended).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(cancel) = self.active.get(call_id) {
            cancel.cancel();
        }

        if let Some(control_id) = control_id.map(str::to_string).or(record.control_id) {
            if let Err(e) = self.telephony.hangup(&control_id).await {
                tracing::warn!(call_id, error = %e, "Hangup on voicemail failed");
            }
        }
        metrics::counter!("calls_voicemail_total").increment(1);
        Ok(())
    }

    async fn on_hangup(&self, call_id: &str, cause: &str) -> Result<(), ServerError> {
        if let Some((_, cancel)) = self.active.remove(call_id) {
            cancel.cancel();
            tracing::info!(call_id, "Call runtime cancelled");
        }
        self.report_active();

        let Some(record) = self.record(call_id).await? else {
            self.sessions.delete(call_id).await?;
            return Ok(());
        };
        if record.ended_at.is_some() {
            tracing::debug!(call_id, "Hangup already handled");
            return Ok(());
        }

        let session = self.sessions.get(call_id).await?;
        let transcript = session.as_ref().map(|s| s.transcript()).unwrap_or_default();
        let history = session
            .as_ref()
            .map(|s| s.history().to_vec())
            .unwrap_or_default();

        let status = match record.status {
            CallStatus::Voicemail | CallStatus::Failed | CallStatus::NoAnswer => record.status,
            _ if record.answered_at.is_none() => CallStatus::NoAnswer,
            _ => CallStatus::Completed,
        };
        self.records
            .complete(call_id, status, transcript, Utc::now())
            .await?;
        if status == CallStatus::NoAnswer {
            self.records.set_outcome(call_id, CallOutcome::NoAnswer).await?;
        }
        self.sessions.delete(call_id).await?;

        metrics::counter!("calls_completed_total", "status" => status.as_str()).increment(1);
        tracing::info!(call_id, hangup_cause = cause, status = status.as_str(), "Call completed");

        tokio::spawn(analyze_call(
            self.llm.clone(),
            self.records.clone(),
            call_id.to_string(),
            history,
        ));
        Ok(())
    }

    async fn on_recording(&self, call_id: &str, url: Option<&str>) -> Result<(), ServerError> {
        let Some(url) = url else {
            tracing::debug!(call_id, "Recording event without a url");
            return Ok(());
        };
        if self.record(call_id).await?.is_none() {
            return Ok(());
        }
        self.records.set_recording(call_id, url).await?;
        tracing::info!(call_id, url, "Recording saved");
        Ok(())
    }

    async fn on_bridged(&self, call_id: &str) -> Result<(), ServerError> {
        if self.record(call_id).await?.is_none() {
            return Ok(());
        }
        self.records
            .set_outcome(call_id, CallOutcome::TransferredToHuman)
            .await?;
        tracing::info!(call_id, "Call bridged to a human");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_agent_core::{CallSession, NewTurn, ToolInvocation, ToolResult};
    use call_agent_persistence::{InMemoryCallRecords, InMemorySessionStore};
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::telephony::encode_client_state;
    use crate::test_support::{fakes, seed_record, settings, DownLlm, Fakes, MockTelephony};

    struct Fixture {
        lifecycle: CallLifecycle,
        sessions: Arc<InMemorySessionStore>,
        records: Arc<InMemoryCallRecords>,
        telephony: Arc<MockTelephony>,
    }

    async fn fixture_with(telephony: MockTelephony) -> Fixture {
        fixture_from(fakes(telephony)).await
    }

    async fn fixture_from(f: Fakes) -> Fixture {
        seed_record(&f.records, "c1").await;
        f.sessions
            .create(CallSession::new("c1", "t1", "p1", "+15550001111"))
            .await
            .unwrap();

        Fixture {
            lifecycle: CallLifecycle::new(Arc::new(settings()), &f.deps),
            sessions: f.sessions,
            records: f.records,
            telephony: f.telephony,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MockTelephony::default()).await
    }

    fn event(kind: EventKind) -> TelephonyEvent {
        TelephonyEvent::new(kind)
            .with_control_id("ctl-1")
            .with_client_state(encode_client_state("c1"))
    }

    #[tokio::test]
    async fn test_initiated_maps_control_id() {
        let f = fixture().await;
        f.lifecycle.handle(event(EventKind::Initiated)).await.unwrap();

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Initiated);
        assert_eq!(record.control_id.as_deref(), Some("ctl-1"));
        assert_eq!(
            f.sessions.resolve_control_id("ctl-1").await.unwrap().as_deref(),
            Some("c1")
        );
    }

    #[tokio::test]
    async fn test_answered_starts_inbound_relay_once() {
        let f = fixture().await;
        f.lifecycle.handle(event(EventKind::Answered)).await.unwrap();
        f.lifecycle.handle(event(EventKind::Answered)).await.unwrap();

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Answered);
        assert!(record.answered_at.is_some());
        assert_eq!(
            f.telephony.commands(),
            vec!["relay ctl-1 wss://agent.example/ws/calls/c1 true"]
        );
    }

    #[tokio::test]
    async fn test_relay_failure_hangs_up() {
        let f = fixture_with(MockTelephony {
            fail_relay: true,
            ..Default::default()
        })
        .await;
        f.lifecycle.handle(event(EventKind::Answered)).await.unwrap();

        let commands = f.telephony.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1], "hangup ctl-1");
    }

    #[tokio::test]
    async fn test_machine_detected_goes_to_voicemail() {
        let f = fixture().await;
        let cancel = CallCancellation::new();
        f.lifecycle.register("c1", cancel.clone());

        f.lifecycle
            .handle(event(EventKind::MachineDetected).with_result("machine"))
            .await
            .unwrap();

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Voicemail);
        assert_eq!(record.outcome, Some(CallOutcome::VoicemailLeft));
        let session = f.sessions.get("c1").await.unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Ended);
        assert!(cancel.is_cancelled());
        assert_eq!(f.telephony.commands(), vec!["hangup ctl-1"]);
    }

    #[tokio::test]
    async fn test_human_detection_ignored() {
        let f = fixture().await;
        f.lifecycle
            .handle(event(EventKind::MachineDetected).with_result("human"))
            .await
            .unwrap();

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Pending);
        assert!(f.telephony.commands().is_empty());
    }

    #[tokio::test]
    async fn test_hangup_finalizes_call() {
        let f = fixture().await;
        f.lifecycle.handle(event(EventKind::Answered)).await.unwrap();
        f.sessions.append_turn("c1", NewTurn::agent("Hi Dana")).await.unwrap();
        f.sessions.append_turn("c1", NewTurn::user("Call me later")).await.unwrap();

        let cancel = CallCancellation::new();
        f.lifecycle.register("c1", cancel.clone());
        f.lifecycle.handle(event(EventKind::Hangup)).await.unwrap();

        assert!(cancel.is_cancelled());
        assert!(!f.lifecycle.is_active("c1"));
        assert!(f.sessions.get("c1").await.unwrap().is_none());

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Completed);
        assert_eq!(
            record.transcript.as_deref(),
            Some("[AGENT]: Hi Dana\n[USER]: Call me later")
        );
        assert!(record.ended_at.is_some());
        assert!(record.duration_secs.is_some());

        // Analysis runs in the background
        for _ in 0..100 {
            if f.records.get("c1").await.unwrap().unwrap().analysis.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.outcome, Some(CallOutcome::CallbackRequested));
    }

    #[tokio::test]
    async fn test_booked_call_keeps_outcome_when_analysis_fails() {
        let mut stack = fakes(MockTelephony::default());
        stack.deps.llm = Arc::new(DownLlm);
        let f = fixture_from(stack).await;
        f.lifecycle.handle(event(EventKind::Answered)).await.unwrap();

        f.sessions.append_turn("c1", NewTurn::user("Tuesday works")).await.unwrap();
        let booked = ToolInvocation {
            name: "book_meeting".to_string(),
            arguments: HashMap::new(),
            result: ToolResult::ok(serde_json::json!({"booked": true})),
        };
        f.sessions
            .append_turn(
                "c1",
                NewTurn::agent("You're all set for Tuesday.").with_tool_calls(vec![booked]),
            )
            .await
            .unwrap();
        f.lifecycle.handle(event(EventKind::Hangup)).await.unwrap();

        for _ in 0..100 {
            if f.records.get("c1").await.unwrap().unwrap().outcome.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Completed);
        assert!(record.analysis.is_none());
        assert_eq!(record.outcome, Some(CallOutcome::MeetingBooked));
    }

    #[tokio::test]
    async fn test_duplicate_hangup_is_noop() {
        let f = fixture().await;
        f.lifecycle.handle(event(EventKind::Answered)).await.unwrap();
        f.lifecycle.handle(event(EventKind::Hangup)).await.unwrap();
        let first = f.records.get("c1").await.unwrap().unwrap().ended_at;

        f.lifecycle.handle(event(EventKind::Hangup)).await.unwrap();
        let second = f.records.get("c1").await.unwrap().unwrap().ended_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_hangup_after_voicemail_keeps_status() {
        let f = fixture().await;
        f.lifecycle.handle(event(EventKind::Answered)).await.unwrap();
        f.lifecycle
            .handle(event(EventKind::MachineDetected).with_result("fax"))
            .await
            .unwrap();
        f.lifecycle.handle(event(EventKind::Hangup)).await.unwrap();

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Voicemail);
        assert_eq!(record.outcome, Some(CallOutcome::VoicemailLeft));
    }

    #[tokio::test]
    async fn test_unanswered_hangup_is_no_answer() {
        let f = fixture().await;
        f.lifecycle.handle(event(EventKind::Initiated)).await.unwrap();
        f.lifecycle.handle(event(EventKind::Hangup)).await.unwrap();

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::NoAnswer);
        assert_eq!(record.outcome, Some(CallOutcome::NoAnswer));
    }

    #[tokio::test]
    async fn test_control_id_fallback_and_recording() {
        let f = fixture().await;
        f.lifecycle.handle(event(EventKind::Initiated)).await.unwrap();

        let recording = TelephonyEvent::new(EventKind::RecordingAvailable)
            .with_control_id("ctl-1")
            .with_recording_url("https://rec/c1.mp3");
        f.lifecycle.handle(recording).await.unwrap();

        let bridged = TelephonyEvent::new(EventKind::Bridged).with_control_id("ctl-1");
        f.lifecycle.handle(bridged).await.unwrap();

        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.recording_url.as_deref(), Some("https://rec/c1.mp3"));
        assert_eq!(record.outcome, Some(CallOutcome::TransferredToHuman));
    }

    #[tokio::test]
    async fn test_unknown_call_dropped() {
        let f = fixture().await;
        let stray = TelephonyEvent::new(EventKind::Answered).with_control_id("ctl-unknown");
        f.lifecycle.handle(stray).await.unwrap();
        assert!(f.telephony.commands().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_event_dropped() {
        let f = fixture().await;
        f.lifecycle
            .handle(event(EventKind::Initiated).with_id("evt-1"))
            .await
            .unwrap();
        f.records.set_status("c1", CallStatus::Pending).await.unwrap();

        f.lifecycle
            .handle(event(EventKind::Initiated).with_id("evt-1"))
            .await
            .unwrap();
        let record = f.records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Pending);
    }

    #[tokio::test]
    async fn test_registry_replacement_and_unregister() {
        let f = fixture().await;
        let first = CallCancellation::new();
        let second = CallCancellation::new();

        f.lifecycle.register("c1", first.clone());
        f.lifecycle.register("c1", second.clone());
        assert!(first.is_cancelled());
        assert_eq!(f.lifecycle.active_count(), 1);

        // The first runtime finishing must not evict the second
        f.lifecycle.unregister("c1");
        assert!(f.lifecycle.is_active("c1"));

        second.cancel();
        f.lifecycle.unregister("c1");
        assert!(!f.lifecycle.is_active("c1"));
    }

    #[test]
    fn test_seen_events_bounded() {
        let mut seen = SeenEvents::new();
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        for i in 0..SEEN_EVENT_CAPACITY {
            seen.insert(&format!("e{}", i));
        }
        assert!(seen.insert("a"));
        assert!(seen.order.len() <= SEEN_EVENT_CAPACITY);
    }
}
