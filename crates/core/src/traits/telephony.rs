//! Telephony call-control trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Parameters for an outbound dial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialRequest {
    /// Internal call id, carried back on every signaling event
    pub call_id: String,
    /// Destination number
    pub to: String,
    /// Caller id override
    pub from: Option<String>,
}

/// Outbound commands to the telephony provider
///
/// Every command targets a control identifier issued by the provider. Control
/// identifiers are opaque.
#[async_trait]
pub trait TelephonyControl: Send + Sync + 'static {
    /// Place an outbound call, returning its control identifier
    async fn dial(&self, request: &DialRequest) -> Result<String>;

    /// Answer an inbound call
    async fn answer(&self, control_id: &str, call_id: &str) -> Result<()>;

    /// Start relaying call audio to `stream_url`
    async fn start_media_relay(
        &self,
        control_id: &str,
        stream_url: &str,
        inbound_track_only: bool,
    ) -> Result<()>;

    /// Stop relaying call audio
    async fn stop_media_relay(&self, control_id: &str) -> Result<()>;

    /// Hang up the call
    async fn hangup(&self, control_id: &str) -> Result<()>;

    /// Transfer the call to another number
    async fn transfer(&self, control_id: &str, to: &str) -> Result<()>;

    /// Send DTMF tones
    async fn send_dtmf(&self, control_id: &str, digits: &str) -> Result<()>;

    /// Play an audio announcement
    async fn play_audio(&self, control_id: &str, audio_url: &str) -> Result<()>;
}
