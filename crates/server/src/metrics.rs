//! Prometheus metrics
//!
//! The recorder is installed once at startup; `/metrics` renders whatever it
//! has collected. Metric names are registered with descriptions here so a
//! scrape shows them even before the first call.

use axum::{http::StatusCode, response::IntoResponse};
use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder
///
/// Returns `None` when a recorder is already installed by someone else.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe_metrics();
            let _ = HANDLE.set(handle.clone());
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

fn describe_metrics() {
    describe_gauge!("call_active_calls", "Calls with a running media runtime");
    describe_counter!("calls_dialed_total", "Outbound calls accepted by the carrier");
    describe_counter!("call_dial_failures_total", "Outbound dials the carrier rejected");
    describe_counter!("call_dnc_blocked_total", "Dials refused by the do-not-call list");
    describe_counter!("calls_answered_total", "Calls answered by a party");
    describe_counter!("calls_voicemail_total", "Calls that reached a machine");
    describe_counter!("calls_completed_total", "Calls finalized after hangup");
    describe_counter!("call_webhook_events_total", "Signaling events received");
    describe_counter!("call_runtimes_started_total", "Media runtimes started");
    describe_counter!("call_turns_total", "Caller turns answered");
    describe_counter!("call_llm_fallbacks_total", "Turns answered with a canned fallback");
    describe_counter!("call_tool_failures_total", "Tool invocations that failed");
    describe_counter!("call_analysis_failures_total", "Post-call analyses that failed");
    describe_counter!("call_telephony_errors_total", "Call control requests that failed");
    describe_histogram!("call_duration_seconds", Unit::Seconds, "Media runtime duration");
    describe_histogram!("call_turn_latency_ms", Unit::Milliseconds, "Transcript to first audio");
    describe_histogram!("call_llm_latency_ms", Unit::Milliseconds, "Language model latency");
    describe_histogram!("call_tool_latency_ms", Unit::Milliseconds, "Tool invocation latency");
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    match HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}
