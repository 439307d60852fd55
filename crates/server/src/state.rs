//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use call_agent_agent::{OrchestratorConfig, OrchestratorDeps};
use call_agent_config::Settings;
use call_agent_core::SpeechToText;

use crate::dialer::DoNotCallList;
use crate::lifecycle::CallLifecycle;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Collaborators handed to every call runtime
    pub deps: OrchestratorDeps,
    pub stt: Arc<dyn SpeechToText>,
    pub lifecycle: Arc<CallLifecycle>,
    pub do_not_call: Arc<DoNotCallList>,
}

impl AppState {
    pub fn new(settings: Settings, deps: OrchestratorDeps, stt: Arc<dyn SpeechToText>) -> Self {
        let settings = Arc::new(settings);
        let lifecycle = Arc::new(CallLifecycle::new(settings.clone(), &deps));
        let do_not_call = Arc::new(DoNotCallList::new(settings.do_not_call.iter()));
        Self {
            settings,
            deps,
            stt,
            lifecycle,
            do_not_call,
        }
    }

    /// Per-call loop settings
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::from_settings(&self.settings)
    }
}
