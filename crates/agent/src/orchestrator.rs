//! Per-call turn loop
//!
//! One [`TurnOrchestrator`] drives a call from greeting to hang-up:
//!
//! ```text
//! Starting -> Greeting -> Listening -> Thinking -> Speaking
//!                            ^                        |
//!                            +------------------------+
//!                            |
//!                            v
//!                         Ending -> Ended
//! ```
//!
//! Every wait also watches the call's cancellation signal. Once it fires the
//! loop unwinds without speaking again and without hanging up.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use call_agent_config::constants::{limits, timeouts};
use call_agent_config::Settings;
use call_agent_core::{
    AgentProfile, AgentProfileSource, CallCancellation, CallRecordStore, CallSession,
    GenerateRequest, GenerateResponse, LanguageModel, Message, NewTurn, SessionStatus,
    TelephonyControl, TextToSpeech, ToolDefinition, ToolInvocation, ToolResult, TurnRole,
};
use call_agent_persistence::{SessionStore, StoreError};
use call_agent_pipeline::{BridgeHandle, OutboundAudio, SentenceSynthesizer, SpeakingGate};
use call_agent_tools::{ToolContext, ToolDispatcher, END_CALL_TOOL};

use crate::end_detection::{detect_end, strip_markers};
use crate::phrases::*;
use crate::session::{build_session, Contact};
use crate::AgentError;

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_turns: u32,
    /// Used when the agent profile cannot be loaded
    pub max_call_duration: Duration,
    /// Floor for calls with tools enabled
    pub max_call_duration_with_tools: Duration,
    pub hangup_grace: Duration,
    pub context_turns: usize,
    pub llm_timeout: Duration,
    pub tts_timeout: Duration,
    pub default_voice: String,
    pub transfer_number: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: limits::MAX_TURNS,
            max_call_duration: Duration::from_secs(limits::MAX_CALL_DURATION_SECS),
            max_call_duration_with_tools: Duration::from_secs(
                limits::MAX_CALL_DURATION_WITH_TOOLS_SECS,
            ),
            hangup_grace: Duration::from_millis(limits::HANGUP_GRACE_MS),
            context_turns: limits::CONTEXT_TURNS,
            llm_timeout: Duration::from_secs(timeouts::LLM_SECS),
            tts_timeout: Duration::from_millis(timeouts::TTS_MS),
            default_voice: String::new(),
            transfer_number: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let limits = &settings.limits;
        Self {
            max_turns: limits.max_turns,
            max_call_duration: Duration::from_secs(limits.max_call_duration_secs),
            max_call_duration_with_tools: Duration::from_secs(
                limits.max_call_duration_with_tools_secs,
            ),
            hangup_grace: Duration::from_millis(limits.hangup_grace_ms),
            context_turns: limits.context_turns,
            llm_timeout: Duration::from_secs(settings.llm.timeout_secs),
            tts_timeout: Duration::from_millis(settings.speech.tts_timeout_ms),
            default_voice: settings.speech.default_voice.clone(),
            transfer_number: settings.tools.transfer_number.clone(),
        }
    }
}

/// Duration cap for a call
///
/// The profile's limit applies; with tools enabled the call may run at least
/// as long as the tools limit.
pub fn max_call_duration(
    config: &OrchestratorConfig,
    profile: Option<&AgentProfile>,
    tools_enabled: bool,
) -> Duration {
    let base = profile
        .map(|p| Duration::from_secs(p.max_call_duration_secs))
        .unwrap_or(config.max_call_duration);
    if tools_enabled {
        base.max(config.max_call_duration_with_tools)
    } else {
        base
    }
}

/// Shared collaborators
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub sessions: Arc<dyn SessionStore>,
    pub records: Arc<dyn CallRecordStore>,
    pub profiles: Arc<dyn AgentProfileSource>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn TextToSpeech>,
    pub tools: ToolDispatcher,
    pub telephony: Arc<dyn TelephonyControl>,
}

/// Per-call channels
pub struct CallIo {
    /// Final transcripts from the STT session
    pub transcripts: mpsc::Receiver<String>,
    pub outbound: OutboundAudio,
    pub gate: SpeakingGate,
    pub cancel: CallCancellation,
    /// Joined once the call is over
    pub bridge: Option<BridgeHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Starting,
    Greeting,
    Listening,
    Thinking,
    Speaking,
    Ending,
    Ended,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The agent's reply closed the conversation
    AgentEnded,
    /// The model called the end-call tool
    EndCallTool,
    MaxDuration,
    MaxTurns,
    /// The transcript stream ended
    CallerHungUp,
    Cancelled,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::AgentEnded => "agent_ended",
            EndReason::EndCallTool => "end_call_tool",
            EndReason::MaxDuration => "max_duration",
            EndReason::MaxTurns => "max_turns",
            EndReason::CallerHungUp => "caller_hung_up",
            EndReason::Cancelled => "cancelled",
        }
    }

    /// Whether the agent hung up the line itself
    pub fn agent_hung_up(&self) -> bool {
        matches!(
            self,
            EndReason::AgentEnded
                | EndReason::EndCallTool
                | EndReason::MaxDuration
                | EndReason::MaxTurns
        )
    }
}

/// Summary of a finished call loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEnd {
    pub reason: EndReason,
    pub user_turns: u32,
    pub duration: Duration,
}

/// The cancellation signal fired
#[derive(Debug)]
struct Interrupted;

enum Heard {
    Transcript(String),
    OutOfTime,
    Closed,
}

enum Exit {
    /// Say goodbye (unless already said) and hang up
    Hangup(EndReason, Option<&'static str>),
    /// The line is already gone
    Gone(EndReason),
}

/// What the loop knows about the call once it starts
struct LiveCall {
    session: CallSession,
    max_duration: Duration,
    /// Call time already used when the loop picked the session up
    elapsed_at_load: Duration,
    transfer_number: Option<String>,
}

pub struct TurnOrchestrator {
    call_id: String,
    config: OrchestratorConfig,
    deps: OrchestratorDeps,
    io: CallIo,
    synthesizer: SentenceSynthesizer,
    state_tx: watch::Sender<OrchestratorState>,
}

impl TurnOrchestrator {
    pub fn new(
        call_id: impl Into<String>,
        config: OrchestratorConfig,
        deps: OrchestratorDeps,
        io: CallIo,
    ) -> Self {
        let synthesizer = SentenceSynthesizer::new(deps.tts.clone(), config.tts_timeout);
        let (state_tx, _) = watch::channel(OrchestratorState::Starting);
        Self {
            call_id: call_id.into(),
            config,
            deps,
            io,
            synthesizer,
            state_tx,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state_tx.subscribe()
    }

    /// Drive the call to completion
    ///
    /// Whatever the exit path, the call's cancellation fires before this
    /// returns so the bridge and STT session unwind with it.
    pub async fn run(mut self) -> Result<CallEnd, AgentError> {
        let started = Instant::now();
        let result = self.drive(started).await;

        self.set_state(OrchestratorState::Ended);
        self.io.gate.set(false);
        self.io.cancel.cancel();

        let TurnOrchestrator { call_id, io, .. } = self;
        drop(io.outbound);
        drop(io.transcripts);
        if let Some(bridge) = io.bridge {
            bridge.join().await;
        }

        match &result {
            Ok(end) => {
                metrics::counter!("call_loops_ended_total", "reason" => end.reason.as_str())
                    .increment(1);
                tracing::info!(
                    call_id = %call_id,
                    reason = end.reason.as_str(),
                    user_turns = end.user_turns,
                    duration_secs = end.duration.as_secs(),
                    "Call loop finished"
                );
            }
            Err(e) => {
                metrics::counter!("call_loops_ended_total", "reason" => "error").increment(1);
                tracing::error!(call_id = %call_id, error = %e, "Call loop failed");
            }
        }

        result
    }

    async fn drive(&mut self, started: Instant) -> Result<CallEnd, AgentError> {
        let call = match self.load_call().await {
            Ok(call) => call,
            Err(e) => {
                self.hangup().await;
                return Err(e);
            }
        };

        tracing::info!(
            call_id = %self.call_id,
            max_duration_secs = call.max_duration.as_secs(),
            tools = call.session.enabled_tools.len(),
            "Call loop starting"
        );

        let mut user_turns = 0;
        let reason = match self.converse(&call, started, &mut user_turns).await {
            Ok(Exit::Hangup(reason, farewell)) => match self.finish(&call, farewell).await {
                Ok(()) => reason,
                Err(Interrupted) => EndReason::Cancelled,
            },
            Ok(Exit::Gone(reason)) => {
                self.mark_ended().await;
                reason
            }
            Err(Interrupted) => {
                self.mark_ended().await;
                EndReason::Cancelled
            }
        };

        Ok(CallEnd {
            reason,
            user_turns,
            duration: started.elapsed(),
        })
    }

    async fn converse(
        &mut self,
        call: &LiveCall,
        started: Instant,
        user_turns: &mut u32,
    ) -> Result<Exit, Interrupted> {
        self.greet(call).await?;

        loop {
            let elapsed = call.elapsed_at_load + started.elapsed();
            if elapsed >= call.max_duration {
                tracing::info!(call_id = %self.call_id, "Maximum call duration reached");
                return Ok(Exit::Hangup(EndReason::MaxDuration, Some(MAX_DURATION_FAREWELL)));
            }
            if *user_turns >= self.config.max_turns {
                tracing::info!(call_id = %self.call_id, "Maximum turn count reached");
                return Ok(Exit::Hangup(EndReason::MaxTurns, Some(MAX_TURNS_FAREWELL)));
            }

            self.enter(OrchestratorState::Listening, SessionStatus::Listening)
                .await;
            let transcript = match self.listen(call.max_duration - elapsed).await? {
                Heard::Transcript(text) => text,
                Heard::OutOfTime => continue,
                Heard::Closed => {
                    tracing::info!(call_id = %self.call_id, "Transcript stream closed");
                    return Ok(Exit::Gone(EndReason::CallerHungUp));
                }
            };

            let transcript = transcript.trim();
            if transcript.is_empty() {
                continue;
            }

            *user_turns += 1;
            metrics::counter!("call_turns_total").increment(1);
            if let Some(reason) = self.take_turn(call, transcript).await? {
                return Ok(Exit::Hangup(reason, None));
            }
        }
    }

    async fn greet(&self, call: &LiveCall) -> Result<(), Interrupted> {
        self.enter(OrchestratorState::Greeting, SessionStatus::Greeting)
            .await;

        let start = Instant::now();
        let request =
            GenerateRequest::new(&call.session.system_prompt).with_user_message(GREETING_DIRECTIVE);
        let greeting = match self.complete(request, &[]).await? {
            Some(response) => strip_markers(&response.text),
            None => String::new(),
        };
        let greeting = if greeting.is_empty() {
            FALLBACK_GREETING.to_string()
        } else {
            greeting
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        self.say(&call.session, &greeting).await?;
        self.record(NewTurn::agent(greeting).with_latency_ms(latency_ms))
            .await;
        Ok(())
    }

    async fn listen(&mut self, remaining: Duration) -> Result<Heard, Interrupted> {
        let cancel = self.io.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupted),
            _ = tokio::time::sleep(remaining) => Ok(Heard::OutOfTime),
            text = self.io.transcripts.recv() => Ok(match text {
                Some(text) => Heard::Transcript(text),
                None => Heard::Closed,
            }),
        }
    }

    /// One user utterance in, one agent reply out
    async fn take_turn(
        &self,
        call: &LiveCall,
        transcript: &str,
    ) -> Result<Option<EndReason>, Interrupted> {
        let start = Instant::now();
        self.enter(OrchestratorState::Thinking, SessionStatus::Processing)
            .await;
        self.record(NewTurn::user(transcript)).await;
        tracing::debug!(call_id = %self.call_id, transcript, "Caller said");

        let tools = self
            .deps
            .tools
            .registry()
            .definitions_for(&call.session.enabled_tools);
        let request = self.context_request(&call.session).await;
        let response = match self.complete(request, &tools).await? {
            Some(response) => response,
            None => GenerateResponse::text(LLM_FALLBACK),
        };

        let (reply, invocations) = if response.has_tool_calls() {
            self.tool_round(call, response).await?
        } else {
            (response.text, Vec::new())
        };

        let ended_by_tool = invocations
            .iter()
            .any(|inv| inv.name == END_CALL_TOOL && inv.result.is_ok());
        let signal = detect_end(&reply);
        let ending = signal.ends_call() || ended_by_tool;
        let mut spoken = strip_markers(&reply);
        if spoken.is_empty() {
            spoken = if ending { AGENT_FAREWELL } else { LLM_FALLBACK }.to_string();
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        metrics::histogram!("call_turn_latency_ms").record(latency_ms as f64);

        self.say(&call.session, &spoken).await?;

        let mut turn = NewTurn::agent(spoken).with_latency_ms(latency_ms);
        if !invocations.is_empty() {
            turn = turn.with_tool_calls(invocations);
        }
        self.record(turn).await;

        Ok(if ended_by_tool {
            Some(EndReason::EndCallTool)
        } else if signal.ends_call() {
            Some(EndReason::AgentEnded)
        } else {
            None
        })
    }

    /// Run requested tools while a lead-in plays, then ask for the final reply
    async fn tool_round(
        &self,
        call: &LiveCall,
        response: GenerateResponse,
    ) -> Result<(String, Vec<ToolInvocation>), Interrupted> {
        let names: Vec<&str> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
        tracing::info!(call_id = %self.call_id, tools = ?names, "Model requested tools");

        let lead_in = strip_markers(&response.text);
        let lead_in = if lead_in.is_empty() {
            TOOL_FILLER.to_string()
        } else {
            lead_in
        };

        let ctx = self.tool_context(call).await;
        let (spoken, invocations) = tokio::join!(
            self.say(&call.session, &lead_in),
            self.until_cancelled(self.deps.tools.execute_all(&response.tool_calls, &ctx)),
        );
        spoken?;
        let invocations = invocations?;
        self.record(NewTurn::agent(lead_in)).await;

        self.enter(OrchestratorState::Thinking, SessionStatus::Processing)
            .await;
        let results: HashMap<String, ToolResult> = invocations
            .iter()
            .map(|inv| (inv.name.clone(), inv.result.clone()))
            .collect();
        self.store_op(
            "set_pending_tool_results",
            self.deps
                .sessions
                .set_pending_tool_results(&self.call_id, results.clone())
                .await,
        );

        let mut results_turn = NewTurn::system(render_tool_results(&invocations));
        results_turn.tool_results = Some(results);
        self.record(results_turn).await;

        let follow_up = self
            .context_request(&call.session)
            .await
            .with_user_message(TOOL_FOLLOW_UP_DIRECTIVE);
        let reply = match self.complete(follow_up, &[]).await? {
            Some(r) if !r.text.trim().is_empty() => r.text,
            _ => TOOL_FALLBACK.to_string(),
        };

        self.store_op(
            "clear_pending_tool_results",
            self.deps
                .sessions
                .set_pending_tool_results(&self.call_id, HashMap::new())
                .await,
        );

        Ok((reply, invocations))
    }

    async fn finish(&self, call: &LiveCall, farewell: Option<&str>) -> Result<(), Interrupted> {
        self.set_state(OrchestratorState::Ending);

        if let Some(farewell) = farewell {
            self.say(&call.session, farewell).await?;
            self.record(NewTurn::agent(farewell)).await;
        }

        self.mark_ended().await;
        self.pause(self.config.hangup_grace).await?;
        self.hangup().await;
        Ok(())
    }

    /// Speak `text` and hold the speaking flag until it should have played out
    async fn say(&self, session: &CallSession, text: &str) -> Result<(), Interrupted> {
        self.set_state(OrchestratorState::Speaking);
        self.store_op(
            "set_status",
            self.deps
                .sessions
                .set_status(&self.call_id, SessionStatus::Speaking)
                .await,
        );
        self.store_op(
            "set_speaking",
            self.deps.sessions.set_speaking(&self.call_id, true).await,
        );
        self.io.gate.set(true);

        let played = self.play(&session.voice_id, text).await;

        self.io.gate.set(false);
        self.store_op(
            "set_speaking",
            self.deps.sessions.set_speaking(&self.call_id, false).await,
        );
        played
    }

    async fn play(&self, voice_id: &str, text: &str) -> Result<(), Interrupted> {
        let spoken = match self
            .until_cancelled(self.synthesizer.speak(text, voice_id, &self.io.outbound))
            .await?
        {
            Ok(spoken) => spoken,
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, error = %e, "Could not queue agent audio");
                return Ok(());
            }
        };

        if let Some(first_audio_at) = spoken.first_audio_at {
            let remaining = spoken.duration().saturating_sub(first_audio_at.elapsed());
            self.pause(remaining).await?;
        }
        Ok(())
    }

    /// LLM call with timeout; `None` when it failed
    async fn complete(
        &self,
        request: GenerateRequest,
        tools: &[ToolDefinition],
    ) -> Result<Option<GenerateResponse>, Interrupted> {
        let llm = &self.deps.llm;
        let call = async {
            if tools.is_empty() {
                llm.generate(request).await
            } else {
                llm.generate_with_tools(request, tools).await
            }
        };

        match self
            .until_cancelled(tokio::time::timeout(self.config.llm_timeout, call))
            .await?
        {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(e)) => {
                metrics::counter!("call_llm_fallbacks_total").increment(1);
                tracing::warn!(call_id = %self.call_id, error = %e, "Completion failed");
                Ok(None)
            }
            Err(_) => {
                metrics::counter!("call_llm_fallbacks_total").increment(1);
                tracing::warn!(
                    call_id = %self.call_id,
                    timeout_secs = self.config.llm_timeout.as_secs(),
                    "Completion timed out"
                );
                Ok(None)
            }
        }
    }

    async fn context_request(&self, session: &CallSession) -> GenerateRequest {
        let turns = self
            .store_op(
                "context",
                self.deps
                    .sessions
                    .context(&self.call_id, self.config.context_turns)
                    .await,
            )
            .unwrap_or_default();

        turns.into_iter().fold(
            GenerateRequest::new(&session.system_prompt),
            |request, turn| {
                let message = match turn.role {
                    TurnRole::User => Message::user(turn.content),
                    TurnRole::Agent => Message::assistant(turn.content),
                    TurnRole::System => Message::system(turn.content),
                };
                request.with_message(message)
            },
        )
    }

    async fn tool_context(&self, call: &LiveCall) -> ToolContext {
        let session = &call.session;
        ToolContext::new(&self.call_id, &session.tenant_id)
            .with_contact(&session.contact_phone, session.contact_metadata.clone())
            .with_telephony(self.deps.telephony.clone(), self.control_id().await)
            .with_transfer_number(call.transfer_number.clone())
    }

    async fn load_call(&self) -> Result<LiveCall, AgentError> {
        let existing = match self.deps.sessions.get(&self.call_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, error = %e, "Session read failed");
                None
            }
        };

        let (session, profile) = match existing {
            Some(session) => {
                let profile = match self
                    .deps
                    .profiles
                    .get_profile(&session.agent_profile_id)
                    .await
                {
                    Ok(profile) => profile,
                    Err(e) => {
                        tracing::warn!(call_id = %self.call_id, error = %e, "Profile lookup failed");
                        None
                    }
                };
                (session, profile)
            }
            None => {
                let (session, profile) = self.rebuild_session().await?;
                (session, Some(profile))
            }
        };

        let max_duration = max_call_duration(&self.config, profile.as_ref(), session.tools_enabled());
        let elapsed_at_load = session.elapsed();
        let transfer_number = profile
            .and_then(|p| p.transfer_number)
            .or_else(|| self.config.transfer_number.clone());

        Ok(LiveCall {
            session,
            max_duration,
            elapsed_at_load,
            transfer_number,
        })
    }

    /// Recreate a missing session from the call record and its profile
    async fn rebuild_session(&self) -> Result<(CallSession, AgentProfile), AgentError> {
        let record = self
            .deps
            .records
            .get(&self.call_id)
            .await
            .map_err(|e| AgentError::SessionUnavailable(e.to_string()))?
            .ok_or_else(|| {
                AgentError::SessionUnavailable(format!("no call record for {}", self.call_id))
            })?;

        let profile = self
            .deps
            .profiles
            .get_profile(&record.agent_profile_id)
            .await
            .map_err(|e| AgentError::SessionUnavailable(e.to_string()))?
            .ok_or_else(|| {
                AgentError::SessionUnavailable(format!(
                    "unknown agent profile {}",
                    record.agent_profile_id
                ))
            })?;

        let session = build_session(
            &self.call_id,
            &profile,
            &Contact::from_record(&record),
            &self.config.default_voice,
        );

        match self.deps.sessions.create(session.clone()).await {
            Ok(()) => {
                tracing::info!(call_id = %self.call_id, "Session rebuilt from call record");
                Ok((session, profile))
            }
            Err(StoreError::AlreadyExists(_)) => {
                let stored = self.deps.sessions.get(&self.call_id).await?;
                Ok((stored.unwrap_or(session), profile))
            }
            Err(e) => Err(AgentError::SessionUnavailable(e.to_string())),
        }
    }

    async fn control_id(&self) -> Option<String> {
        match self.deps.records.get(&self.call_id).await {
            Ok(record) => record.and_then(|r| r.control_id),
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, error = %e, "Call record read failed");
                None
            }
        }
    }

    async fn hangup(&self) {
        let Some(control_id) = self.control_id().await else {
            tracing::warn!(call_id = %self.call_id, "No control id, cannot hang up");
            return;
        };
        match self.deps.telephony.hangup(&control_id).await {
            Ok(()) => tracing::info!(call_id = %self.call_id, "Hung up"),
            Err(e) => tracing::warn!(call_id = %self.call_id, error = %e, "Hang-up failed"),
        }
    }

    async fn mark_ended(&self) {
        if let Err(e) = self
            .deps
            .sessions
            .set_status(&self.call_id, SessionStatus::Ended)
            .await
        {
            tracing::debug!(call_id = %self.call_id, error = %e, "Session already gone");
        }
    }

    async fn record(&self, turn: NewTurn) {
        self.store_op(
            "append_turn",
            self.deps.sessions.append_turn(&self.call_id, turn).await,
        );
    }

    async fn enter(&self, state: OrchestratorState, status: SessionStatus) {
        self.set_state(state);
        self.store_op(
            "set_status",
            self.deps.sessions.set_status(&self.call_id, status).await,
        );
    }

    fn set_state(&self, state: OrchestratorState) {
        self.state_tx.send_replace(state);
    }

    fn store_op<T>(&self, op: &'static str, result: Result<T, StoreError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, op, error = %e, "Session store update failed");
                None
            }
        }
    }

    async fn pause(&self, duration: Duration) -> Result<(), Interrupted> {
        self.until_cancelled(tokio::time::sleep(duration)).await
    }

    async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = self.io.cancel.cancelled() => Err(Interrupted),
            out = fut => Ok(out),
        }
    }
}

/// Text of the system turn that hands tool results back to the model
pub fn render_tool_results(invocations: &[ToolInvocation]) -> String {
    let mut text = String::from(TOOL_RESULTS_HEADER);
    for inv in invocations {
        text.push_str(&format!("\nTool '{}' returned: {}", inv.name, inv.result.to_json()));
    }
    text
}
