//! Speech processing traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// One streaming transcription session
///
/// Linear PCM chunks go in through `audio_tx`; finalized transcripts come out
/// of `transcripts`. Dropping `audio_tx` ends the input stream, after which the
/// session flushes any pending utterance and closes `transcripts`.
#[derive(Debug)]
pub struct SttSession {
    pub audio_tx: mpsc::Sender<Vec<i16>>,
    pub transcripts: mpsc::Receiver<String>,
}

/// Speech-to-Text interface
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Open a streaming session for one call
    async fn start_session(&self, call_id: &str) -> Result<SttSession>;

    /// Sample rate expected on `audio_tx`
    fn input_sample_rate(&self) -> u32 {
        16000
    }

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize text to linear PCM at [`TextToSpeech::output_sample_rate`]
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<i16>>;

    /// Native output sample rate
    fn output_sample_rate(&self) -> u32 {
        24000
    }

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoStt;

    #[async_trait]
    impl SpeechToText for EchoStt {
        async fn start_session(&self, _call_id: &str) -> Result<SttSession> {
            let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<i16>>(8);
            let (text_tx, transcripts) = mpsc::channel(8);
            tokio::spawn(async move {
                while let Some(chunk) = audio_rx.recv().await {
                    let _ = text_tx.send(format!("{} samples", chunk.len())).await;
                }
            });
            Ok(SttSession { audio_tx, transcripts })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_session_closes_when_input_dropped() {
        let stt = EchoStt;
        let SttSession { audio_tx, mut transcripts } = stt.start_session("c1").await.unwrap();
        audio_tx.send(vec![0; 320]).await.unwrap();
        drop(audio_tx);
        assert_eq!(transcripts.recv().await.as_deref(), Some("320 samples"));
        assert!(transcripts.recv().await.is_none());
        assert_eq!(stt.input_sample_rate(), 16000);
    }
}
