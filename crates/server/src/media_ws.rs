//! Per-call media websocket
//!
//! GET /ws/calls/:call_id
//!
//! The telephony provider connects here once the media relay starts. The
//! socket is split into a reader feeding the audio bridge and a writer
//! draining it; the turn loop runs until the call ends, then both halves are
//! torn down.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::Instrument;

use call_agent_agent::{CallIo, TurnOrchestrator};
use call_agent_core::{CallCancellation, CallRecordStore, SpeechToText};
use call_agent_pipeline::{AudioBridge, BridgeConfig, SpeakingGate};

use crate::state::AppState;
use crate::ServerError;

/// Relay frames buffered ahead of the bridge
const INBOUND_FRAME_BUFFER: usize = 256;
/// Frames buffered ahead of the socket writer
const OUTBOUND_FRAME_BUFFER: usize = 256;

/// Accept the relay connection for a live call
pub async fn media_ws_handler(
    ws: WebSocketUpgrade,
    Path(call_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ServerError> {
    let record = state
        .deps
        .records
        .get(&call_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("call {}", call_id)))?;

    if record.status.is_terminal() {
        return Err(ServerError::InvalidRequest(format!(
            "call {} already ended ({})",
            call_id,
            record.status.as_str()
        )));
    }

    tracing::info!(call_id = %call_id, "Media relay connecting");
    Ok(ws.on_upgrade(move |socket| run_call(socket, call_id, state)))
}

async fn run_call(socket: WebSocket, call_id: String, state: AppState) {
    let span = tracing::info_span!("call", call_id = %call_id);
    serve_call(socket, call_id, state).instrument(span).await
}

async fn serve_call(socket: WebSocket, call_id: String, state: AppState) {
    let stt = match state.stt.start_session(&call_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open STT session");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let (relay_tx, relay_rx) = mpsc::channel::<String>(INBOUND_FRAME_BUFFER);
    let (frames_tx, mut frames_rx) = mpsc::channel::<String>(OUTBOUND_FRAME_BUFFER);

    let cancel = CallCancellation::new();
    let gate = SpeakingGate::new();
    let bridge_config =
        BridgeConfig::from_limits(&state.settings.limits, state.stt.input_sample_rate());
    let (bridge, outbound) = AudioBridge::attach(
        &call_id,
        bridge_config,
        relay_rx,
        frames_tx,
        stt.audio_tx,
        gate.clone(),
        cancel.clone(),
    );

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    message = stream.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            if relay_tx.send(text).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Media relay closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Media relay read failed");
                            break;
                        }
                    },
                }
            }
        }
        .in_current_span(),
    );

    let io = CallIo {
        transcripts: stt.transcripts,
        outbound,
        gate,
        cancel: cancel.clone(),
        bridge: Some(bridge),
    };
    let orchestrator = TurnOrchestrator::new(
        call_id.clone(),
        state.orchestrator_config(),
        state.deps.clone(),
        io,
    );

    state.lifecycle.register(&call_id, cancel.clone());
    metrics::counter!("call_runtimes_started_total").increment(1);

    match orchestrator.run().await {
        Ok(end) => {
            metrics::histogram!("call_duration_seconds").record(end.duration.as_secs_f64());
            tracing::info!(
                reason = end.reason.as_str(),
                user_turns = end.user_turns,
                duration_secs = end.duration.as_secs(),
                "Call runtime finished"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Call runtime failed"),
    }

    // unregister only evicts a cancelled handle
    cancel.cancel();
    state.lifecycle.unregister(&call_id);
    let _ = reader.await;
    let _ = writer.await;
}
