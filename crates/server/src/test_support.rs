//! In-process fakes shared by the server's unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use call_agent_agent::OrchestratorDeps;
use call_agent_config::Settings;
use call_agent_core::{
    AgentProfile, CallRecord, CallRecordStore, DialRequest, GenerateRequest, GenerateResponse,
    LanguageModel, Result, SpeechToText, SttSession, TelephonyControl, TextToSpeech,
    ToolDefinition,
};
use call_agent_persistence::{InMemoryCallRecords, InMemorySessionStore, StaticProfileSource};
use call_agent_tools::{ToolDispatcher, ToolRegistry};

use crate::state::AppState;

/// Records every command as a line of text
#[derive(Default)]
pub struct MockTelephony {
    pub commands: Mutex<Vec<String>>,
    pub fail_relay: bool,
    pub fail_dial: bool,
}

impl MockTelephony {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl TelephonyControl for MockTelephony {
    async fn dial(&self, request: &DialRequest) -> Result<String> {
        self.commands
            .lock()
            .push(format!("dial {} {}", request.call_id, request.to));
        if self.fail_dial {
            return Err(call_agent_core::Error::Telephony("HTTP 403: forbidden".into()));
        }
        Ok(format!("ctl-{}", request.call_id))
    }

    async fn answer(&self, control_id: &str, _call_id: &str) -> Result<()> {
        self.commands.lock().push(format!("answer {}", control_id));
        Ok(())
    }

    async fn start_media_relay(&self, control_id: &str, url: &str, inbound: bool) -> Result<()> {
        self.commands
            .lock()
            .push(format!("relay {} {} {}", control_id, url, inbound));
        if self.fail_relay {
            return Err(call_agent_core::Error::Telephony("HTTP 422: bad".into()));
        }
        Ok(())
    }

    async fn stop_media_relay(&self, _control_id: &str) -> Result<()> {
        Ok(())
    }

    async fn hangup(&self, control_id: &str) -> Result<()> {
        self.commands.lock().push(format!("hangup {}", control_id));
        Ok(())
    }

    async fn transfer(&self, _control_id: &str, _to: &str) -> Result<()> {
        Ok(())
    }

    async fn send_dtmf(&self, _control_id: &str, _digits: &str) -> Result<()> {
        Ok(())
    }

    async fn play_audio(&self, _control_id: &str, _audio_url: &str) -> Result<()> {
        Ok(())
    }
}

/// Answers every request with a fixed analysis
pub struct SummaryLlm;

#[async_trait]
impl LanguageModel for SummaryLlm {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse::text(
            r#"{"summary": "Short chat.", "outcome": "callback_requested", "sentiment": "neutral"}"#,
        ))
    }

    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        _tools: &[ToolDefinition],
    ) -> Result<GenerateResponse> {
        self.generate(request).await
    }

    fn model_name(&self) -> &str {
        "summary"
    }
}

/// Every completion fails
pub struct DownLlm;

#[async_trait]
impl LanguageModel for DownLlm {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
        Err(call_agent_core::Error::Llm("HTTP 503: unavailable".into()))
    }

    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        _tools: &[ToolDefinition],
    ) -> Result<GenerateResponse> {
        self.generate(request).await
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

pub struct SilentTts;

#[async_trait]
impl TextToSpeech for SilentTts {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Vec<i16>> {
        Ok(Vec::new())
    }

    fn model_name(&self) -> &str {
        "silent"
    }
}

/// Never produces a transcript
pub struct SilentStt;

#[async_trait]
impl SpeechToText for SilentStt {
    async fn start_session(&self, _call_id: &str) -> Result<SttSession> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<i16>>(8);
        let (text_tx, transcripts) = mpsc::channel(8);
        tokio::spawn(async move {
            while audio_rx.recv().await.is_some() {}
            drop(text_tx);
        });
        Ok(SttSession {
            audio_tx,
            transcripts,
        })
    }

    fn model_name(&self) -> &str {
        "silent"
    }
}

pub struct Fakes {
    pub sessions: Arc<InMemorySessionStore>,
    pub records: Arc<InMemoryCallRecords>,
    pub telephony: Arc<MockTelephony>,
    pub deps: OrchestratorDeps,
}

pub fn profile() -> AgentProfile {
    let mut profile = AgentProfile::new("p1", "t1");
    profile.agent_name = "Maya".to_string();
    profile.company_name = "Acme Solar".to_string();
    profile
}

pub fn fakes(telephony: MockTelephony) -> Fakes {
    let sessions = Arc::new(InMemorySessionStore::new(
        Duration::from_secs(3600),
        Duration::from_secs(7200),
    ));
    let records = Arc::new(InMemoryCallRecords::new());
    let telephony = Arc::new(telephony);

    let deps = OrchestratorDeps {
        sessions: sessions.clone(),
        records: records.clone(),
        profiles: Arc::new(StaticProfileSource::new([profile()])),
        llm: Arc::new(SummaryLlm),
        tts: Arc::new(SilentTts),
        tools: ToolDispatcher::new(Arc::new(ToolRegistry::new()), Duration::from_secs(1)),
        telephony: telephony.clone(),
    };

    Fakes {
        sessions,
        records,
        telephony,
        deps,
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.public_base_url = "https://agent.example".to_string();
    settings.do_not_call = vec!["+15550009999".to_string()];
    settings
}

pub fn app_state(fakes: &Fakes) -> AppState {
    AppState::new(settings(), fakes.deps.clone(), Arc::new(SilentStt))
}

pub async fn seed_record(records: &InMemoryCallRecords, call_id: &str) {
    records
        .upsert(CallRecord {
            call_id: call_id.to_string(),
            tenant_id: "t1".to_string(),
            agent_profile_id: "p1".to_string(),
            contact_phone: "+15550001111".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
}
