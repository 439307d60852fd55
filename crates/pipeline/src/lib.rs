//! Real-time audio pipeline for live calls
//!
//! Features:
//! - Media relay frame protocol (base64 μ-law JSON frames)
//! - Audio bridge with echo gating and backpressured outbound audio
//! - Energy-endpointed streaming STT over HTTP
//! - Sentence-streaming TTS over HTTP

pub mod bridge;
pub mod media;
pub mod stt;
pub mod tts;

pub use bridge::{
    AudioBridge, AudioChunk, BridgeConfig, BridgeHandle, BridgeStats, OutboundAudio, SpeakingGate,
};
pub use media::{decode_inbound_audio, encode_outbound_audio, InboundFrame, OutboundFrame};
pub use stt::{Endpointer, EndpointerConfig, HttpStt, HttpSttConfig};
pub use tts::{split_into_sentences, HttpTts, HttpTtsConfig, SentenceSynthesizer, SpokenAudio};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout(0)
        } else {
            PipelineError::Http(err.to_string())
        }
    }
}

impl From<PipelineError> for call_agent_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Stt(msg) => call_agent_core::Error::Stt(msg),
            PipelineError::Tts(msg) => call_agent_core::Error::Tts(msg),
            PipelineError::ChannelClosed => {
                call_agent_core::Error::ChannelClosed("audio pipeline".to_string())
            }
            PipelineError::Timeout(ms) => call_agent_core::Error::Timeout(ms),
            other => call_agent_core::Error::Telephony(other.to_string()),
        }
    }
}
