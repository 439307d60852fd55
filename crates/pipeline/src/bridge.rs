//! Audio Bridge
//!
//! Joins one call's media relay to the speech pipeline:
//! - inbound: caller μ-law 8kHz -> linear PCM at the STT rate, gated while
//!   the agent is speaking so its own voice is never transcribed
//! - outbound: synthesized PCM -> μ-law 8kHz media frames, each followed by a
//!   `chunk-N` mark
//!
//! A `stop` frame, a closed relay or call cancellation ends both directions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use call_agent_config::LimitsConfig;
use call_agent_core::CallCancellation;

use crate::media::{decode_inbound_audio, encode_outbound_audio, InboundFrame, OutboundFrame};
use crate::PipelineError;

/// Linear PCM headed for the caller
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Write side of the outbound queue
///
/// `send` waits when the queue is full, so a slow relay slows synthesis
/// instead of growing memory.
#[derive(Debug, Clone)]
pub struct OutboundAudio {
    call_id: Arc<str>,
    tx: mpsc::Sender<AudioChunk>,
    backlog_warn: usize,
}

impl OutboundAudio {
    pub async fn send(&self, chunk: AudioChunk) -> Result<(), PipelineError> {
        let backlog = self.backlog();
        if backlog >= self.backlog_warn {
            metrics::counter!("call_outbound_backlog_warnings_total").increment(1);
            tracing::warn!(call_id = %self.call_id, backlog, "Outbound audio backlog");
        }
        self.tx
            .send(chunk)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Chunks queued but not yet written to the relay
    pub fn backlog(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Shared "agent is speaking" flag
#[derive(Debug, Clone, Default)]
pub struct SpeakingGate(Arc<AtomicBool>);

impl SpeakingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, speaking: bool) {
        self.0.store(speaking, Ordering::SeqCst);
    }

    pub fn is_speaking(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Rate of the relay's μ-law stream
    pub telephony_rate: u32,
    /// Rate delivered to STT
    pub stt_rate: u32,
    /// Outbound queue capacity in chunks
    pub buffer_chunks: usize,
    /// Backlog at which a warning is emitted
    pub backlog_warn: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            telephony_rate: 8000,
            stt_rate: 16000,
            buffer_chunks: 64,
            backlog_warn: 48,
        }
    }
}

impl BridgeConfig {
    pub fn from_limits(limits: &LimitsConfig, stt_rate: u32) -> Self {
        Self {
            stt_rate,
            buffer_chunks: limits.outbound_buffer_chunks.max(1),
            backlog_warn: limits.outbound_backlog_warn,
            ..Default::default()
        }
    }
}

/// Frame counters for one bridge
#[derive(Debug, Default)]
pub struct BridgeStats {
    forwarded: AtomicU64,
    suppressed: AtomicU64,
    other_track: AtomicU64,
    chunks_sent: AtomicU64,
}

impl BridgeStats {
    /// Caller frames delivered to STT
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Caller frames dropped while the agent was speaking
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Frames from a non-caller track
    pub fn other_track(&self) -> u64 {
        self.other_track.load(Ordering::Relaxed)
    }

    /// Outbound chunks written to the relay
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }
}

/// Running bridge tasks
#[derive(Debug)]
pub struct BridgeHandle {
    stats: Arc<BridgeStats>,
    cancel: CallCancellation,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn stats(&self) -> Arc<BridgeStats> {
        self.stats.clone()
    }

    /// Wait for both directions to finish
    pub async fn join(self) {
        let _ = self.inbound.await;
        let _ = self.outbound.await;
    }

    /// Stop both directions and signal the call to unwind
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub struct AudioBridge;

impl AudioBridge {
    /// Start both directions for one call.
    ///
    /// `inbound` yields raw relay text frames, `ws_out` accepts them. Dropping
    /// the returned [`OutboundAudio`] (all clones) ends the outbound task.
    #[allow(clippy::too_many_arguments)]
    pub fn attach(
        call_id: &str,
        config: BridgeConfig,
        inbound: mpsc::Receiver<String>,
        ws_out: mpsc::Sender<String>,
        stt_audio: mpsc::Sender<Vec<i16>>,
        gate: SpeakingGate,
        cancel: CallCancellation,
    ) -> (BridgeHandle, OutboundAudio) {
        let stats = Arc::new(BridgeStats::default());
        let (audio_tx, audio_rx) = mpsc::channel(config.buffer_chunks.max(1));

        let inbound = tokio::spawn(run_inbound(
            call_id.to_string(),
            config.clone(),
            inbound,
            stt_audio,
            gate,
            cancel.clone(),
            stats.clone(),
        ));
        let outbound = tokio::spawn(run_outbound(
            call_id.to_string(),
            config.telephony_rate,
            audio_rx,
            ws_out,
            cancel.clone(),
            stats.clone(),
        ));

        tracing::debug!(call_id, "Audio bridge attached");

        (
            BridgeHandle {
                stats,
                cancel,
                inbound,
                outbound,
            },
            OutboundAudio {
                call_id: Arc::from(call_id),
                tx: audio_tx,
                backlog_warn: config.backlog_warn,
            },
        )
    }
}

async fn run_inbound(
    call_id: String,
    config: BridgeConfig,
    mut inbound: mpsc::Receiver<String>,
    stt_audio: mpsc::Sender<Vec<i16>>,
    gate: SpeakingGate,
    cancel: CallCancellation,
    stats: Arc<BridgeStats>,
) {
    loop {
        let text = tokio::select! {
            _ = cancel.cancelled() => break,
            text = inbound.recv() => match text {
                Some(text) => text,
                None => {
                    tracing::info!(call_id = %call_id, "Media relay closed");
                    cancel.cancel();
                    break;
                }
            },
        };

        let frame = match InboundFrame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(call_id = %call_id, error = %e, "Ignoring malformed media frame");
                continue;
            }
        };

        match frame {
            InboundFrame::Connected => {
                tracing::debug!(call_id = %call_id, "Media relay connected");
            }
            InboundFrame::Start { stream_id, start } => {
                let format = start.as_ref().and_then(|s| s.media_format.as_ref());
                tracing::info!(
                    call_id = %call_id,
                    stream_id = ?stream_id,
                    encoding = ?format.and_then(|f| f.encoding.as_deref()),
                    "Media stream started"
                );
            }
            InboundFrame::Media { media } => {
                if !media.is_caller_track() {
                    stats.other_track.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                if gate.is_speaking() {
                    stats.suppressed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                match decode_inbound_audio(&media.payload, config.telephony_rate, config.stt_rate)
                {
                    Ok(samples) => {
                        if stt_audio.send(samples).await.is_err() {
                            tracing::debug!(call_id = %call_id, "STT input closed");
                            continue;
                        }
                        stats.forwarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::debug!(call_id = %call_id, error = %e, "Dropping undecodable frame");
                    }
                }
            }
            InboundFrame::Mark { mark } => {
                tracing::trace!(call_id = %call_id, mark = ?mark.map(|m| m.name), "Playback mark");
            }
            InboundFrame::Stop => {
                tracing::info!(call_id = %call_id, "Media stream stopped");
                cancel.cancel();
                break;
            }
            InboundFrame::Unknown => {}
        }
    }

    tracing::debug!(
        call_id = %call_id,
        forwarded = stats.forwarded(),
        suppressed = stats.suppressed(),
        "Inbound audio finished"
    );
}

async fn run_outbound(
    call_id: String,
    telephony_rate: u32,
    mut audio_rx: mpsc::Receiver<AudioChunk>,
    ws_out: mpsc::Sender<String>,
    cancel: CallCancellation,
    stats: Arc<BridgeStats>,
) {
    let mut sequence: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = audio_rx.recv() => match chunk {
                Some(chunk) => chunk,
                None => break,
            },
        };

        if chunk.samples.is_empty() {
            continue;
        }

        let payload = encode_outbound_audio(&chunk.samples, chunk.sample_rate, telephony_rate);
        sequence += 1;
        let frames = [
            OutboundFrame::media(payload),
            OutboundFrame::mark(format!("chunk-{}", sequence)),
        ];

        for frame in frames {
            let json = match frame.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(call_id = %call_id, error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if ws_out.send(json).await.is_err() {
                tracing::debug!(call_id = %call_id, "Media relay writer closed");
                return;
            }
        }
        stats.chunks_sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("call_outbound_chunks_total").increment(1);
    }

    tracing::debug!(call_id = %call_id, chunks = sequence, "Outbound audio finished");
}
