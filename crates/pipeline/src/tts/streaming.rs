//! Sentence-streaming synthesis
//!
//! Synthesizes a reply one sentence at a time and queues each sentence's audio
//! as soon as it is ready, so the caller hears the first sentence while the
//! rest are still being produced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use call_agent_core::TextToSpeech;

use super::split_into_sentences;
use crate::bridge::{AudioChunk, OutboundAudio};
use crate::PipelineError;

/// 20ms frames at the synthesis rate
const FRAME_MS: u32 = 20;

/// Result of speaking one reply
#[derive(Debug, Clone, Default)]
pub struct SpokenAudio {
    /// Sentences that produced audio
    pub sentences: usize,
    /// Total samples queued
    pub samples: usize,
    pub sample_rate: u32,
    /// When the first chunk was queued
    pub first_audio_at: Option<Instant>,
}

impl SpokenAudio {
    /// Playback length of everything queued
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.samples as u64 * 1000 / self.sample_rate as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

pub struct SentenceSynthesizer {
    tts: Arc<dyn TextToSpeech>,
    timeout: Duration,
}

impl SentenceSynthesizer {
    pub fn new(tts: Arc<dyn TextToSpeech>, timeout: Duration) -> Self {
        Self { tts, timeout }
    }

    /// Synthesize `text` and queue it on `outbound`.
    ///
    /// A sentence that fails or times out is skipped; the rest still play.
    /// Only a closed outbound queue is an error.
    pub async fn speak(
        &self,
        text: &str,
        voice_id: &str,
        outbound: &OutboundAudio,
    ) -> Result<SpokenAudio, PipelineError> {
        let sample_rate = self.tts.output_sample_rate();
        let frame_len = (sample_rate * FRAME_MS / 1000).max(1) as usize;
        let mut spoken = SpokenAudio {
            sample_rate,
            ..Default::default()
        };

        for sentence in split_into_sentences(text) {
            let samples =
                match tokio::time::timeout(self.timeout, self.tts.synthesize(&sentence, voice_id))
                    .await
                {
                    Ok(Ok(samples)) => samples,
                    Ok(Err(e)) => {
                        metrics::counter!("call_tts_errors_total").increment(1);
                        tracing::warn!(error = %e, sentence = %sentence, "Sentence synthesis failed, skipping");
                        continue;
                    }
                    Err(_) => {
                        metrics::counter!("call_tts_errors_total").increment(1);
                        tracing::warn!(
                            timeout_ms = self.timeout.as_millis() as u64,
                            sentence = %sentence,
                            "Sentence synthesis timed out, skipping"
                        );
                        continue;
                    }
                };

            if samples.is_empty() {
                continue;
            }

            for frame in samples.chunks(frame_len) {
                outbound
                    .send(AudioChunk::new(frame.to_vec(), sample_rate))
                    .await?;
                spoken.first_audio_at.get_or_insert_with(Instant::now);
            }
            spoken.samples += samples.len();
            spoken.sentences += 1;
        }

        Ok(spoken)
    }
}
