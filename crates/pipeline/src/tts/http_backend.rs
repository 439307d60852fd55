//! HTTP TTS backend
//!
//! Posts text to a synthesis service and reads back raw PCM16 LE audio.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use call_agent_config::SpeechConfig;
use call_agent_core::{pcm16_from_le_bytes, TextToSpeech};

use crate::PipelineError;

/// HTTP TTS backend configuration
#[derive(Debug, Clone)]
pub struct HttpTtsConfig {
    /// Base URL of the synthesis service
    pub url: String,
    /// Output sample rate requested from the service
    pub sample_rate: u32,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpTtsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8091".to_string(),
            sample_rate: 24000,
            timeout_ms: 10_000,
        }
    }
}

impl From<&SpeechConfig> for HttpTtsConfig {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            url: config.tts_url.clone(),
            sample_rate: config.tts_sample_rate,
            timeout_ms: config.tts_timeout_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    sample_rate: u32,
}

pub struct HttpTts {
    config: HttpTtsConfig,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn new(config: HttpTtsConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PipelineError::Tts(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn request(&self, text: &str, voice_id: &str) -> Result<Vec<i16>, PipelineError> {
        let url = format!("{}/synthesize", self.config.url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&SynthesizeRequest {
                text,
                voice: voice_id,
                sample_rate: self.config.sample_rate,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Tts(format!("HTTP {}: {}", status, body)));
        }

        let bytes = response.bytes().await?;
        if bytes.len() % 2 != 0 {
            return Err(PipelineError::Codec(format!(
                "odd PCM16 body length {}",
                bytes.len()
            )));
        }
        Ok(pcm16_from_le_bytes(&bytes))
    }
}

#[async_trait]
impl TextToSpeech for HttpTts {
    async fn synthesize(&self, text: &str, voice_id: &str) -> call_agent_core::Result<Vec<i16>> {
        self.request(text, voice_id)
            .await
            .map_err(|e| call_agent_core::Error::Tts(e.to_string()))
    }

    fn output_sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn model_name(&self) -> &str {
        "http-tts"
    }
}
