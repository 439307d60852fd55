//! HTTP STT backend
//!
//! Sends each endpointed utterance as raw PCM16 to a recognition service and
//! emits the returned text as a finalized transcript.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

use call_agent_config::SpeechConfig;
use call_agent_core::{pcm16_to_le_bytes, SpeechToText, SttSession};

use super::{Endpointer, EndpointerConfig};
use crate::PipelineError;

/// Inbound audio chunks buffered per session (20ms each)
const AUDIO_QUEUE: usize = 256;
/// Utterances waiting for transcription
const UTTERANCE_QUEUE: usize = 8;
/// Transcripts waiting for the orchestrator
const TRANSCRIPT_QUEUE: usize = 16;
/// Time allowed to transcribe the last utterance after input ends
const STOP_GRACE: Duration = Duration::from_secs(2);

/// HTTP STT backend configuration
#[derive(Debug, Clone)]
pub struct HttpSttConfig {
    /// Base URL of the recognition service
    pub url: String,
    /// Language code (e.g., "en-US")
    pub language: String,
    /// Recognition model hint
    pub model: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Utterance segmentation
    pub endpointing: EndpointerConfig,
}

impl Default for HttpSttConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090".to_string(),
            language: "en-US".to_string(),
            model: "telephony".to_string(),
            timeout_ms: 10_000,
            endpointing: EndpointerConfig::default(),
        }
    }
}

impl From<&SpeechConfig> for HttpSttConfig {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            url: config.stt_url.clone(),
            language: config.language.clone(),
            model: config.stt_model.clone(),
            timeout_ms: config.stt_timeout_ms,
            endpointing: EndpointerConfig {
                energy_threshold: config.energy_threshold,
                silence_ms: config.endpoint_silence_ms,
                ..Default::default()
            },
        }
    }
}

/// Response from the recognition service
#[derive(Debug, Deserialize)]
struct SttResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    error: Option<String>,
}

/// Streaming STT over an HTTP recognition service
pub struct HttpStt {
    config: HttpSttConfig,
    client: reqwest::Client,
}

impl HttpStt {
    pub fn new(config: HttpSttConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PipelineError::Stt(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SpeechToText for HttpStt {
    async fn start_session(&self, call_id: &str) -> call_agent_core::Result<SttSession> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<i16>>(AUDIO_QUEUE);
        let (utterance_tx, mut utterance_rx) = mpsc::channel::<Vec<i16>>(UTTERANCE_QUEUE);
        let (transcript_tx, transcripts) = mpsc::channel::<String>(TRANSCRIPT_QUEUE);

        // Segmenter: audio -> utterances
        let endpointing = self.config.endpointing.clone();
        let segment_call_id = call_id.to_string();
        tokio::spawn(async move {
            let mut endpointer = Endpointer::new(endpointing);
            while let Some(chunk) = audio_rx.recv().await {
                if let Some(utterance) = endpointer.push(&chunk) {
                    if utterance_tx.send(utterance).await.is_err() {
                        return;
                    }
                }
            }
            if let Some(utterance) = endpointer.flush() {
                let _ = utterance_tx.send(utterance).await;
            }
            tracing::debug!(call_id = %segment_call_id, "STT input closed");
        });

        // Transcriber: utterances -> finalized text, in order
        let transcriber = Transcriber {
            config: self.config.clone(),
            client: self.client.clone(),
        };
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            while let Some(utterance) = utterance_rx.recv().await {
                let closing = utterance_rx.is_closed();
                let result = if closing {
                    tokio::time::timeout(STOP_GRACE, transcriber.transcribe(&utterance))
                        .await
                        .unwrap_or(Err(PipelineError::Timeout(STOP_GRACE.as_millis() as u64)))
                } else {
                    transcriber.transcribe(&utterance).await
                };

                match result {
                    Ok(text) if !text.is_empty() => {
                        tracing::debug!(call_id = %call_id, chars = text.len(), "Final transcript");
                        if transcript_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        metrics::counter!("call_stt_errors_total").increment(1);
                        tracing::warn!(call_id = %call_id, error = %e, "Transcription failed, utterance dropped");
                    }
                }
            }
        });

        Ok(SttSession {
            audio_tx,
            transcripts,
        })
    }

    fn input_sample_rate(&self) -> u32 {
        self.config.endpointing.sample_rate
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Clone)]
struct Transcriber {
    config: HttpSttConfig,
    client: reqwest::Client,
}

impl Transcriber {
    async fn transcribe(&self, audio: &[i16]) -> Result<String, PipelineError> {
        let url = format!("{}/transcribe", self.config.url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "audio/pcm")
            .header("X-Sample-Rate", self.config.endpointing.sample_rate.to_string())
            .header("X-Language", &self.config.language)
            .header("X-Model", &self.config.model)
            .body(pcm16_to_le_bytes(audio))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Stt(format!(
                "STT service returned error: {}",
                response.status()
            )));
        }

        let result: SttResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Stt(format!("Failed to parse STT response: {}", e)))?;

        if let Some(error) = result.error {
            return Err(PipelineError::Stt(error));
        }

        Ok(result.text.trim().to_string())
    }
}
