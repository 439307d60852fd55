//! Call Agent Server
//!
//! Telephony webhooks, the per-call media websocket, the outbound dialer and
//! the lifecycle controller that ties them to the turn loop.

pub mod analysis;
pub mod dialer;
pub mod http;
pub mod lifecycle;
pub mod media_ws;
pub mod metrics;
pub mod state;
pub mod telephony;
pub mod webhooks;

#[cfg(test)]
mod test_support;

pub use analysis::{analyze_call, parse_analysis};
pub use http::create_router;
pub use lifecycle::CallLifecycle;
pub use metrics::init_metrics;
pub use state::AppState;
pub use telephony::{CallControlClient, CallControlConfig, TelephonyError};
pub use webhooks::{EventKind, TelephonyEvent};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use call_agent_persistence::StoreError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Number {0} is on the Do Not Call list")]
    DoNotCall(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<call_agent_core::Error> for ServerError {
    fn from(err: call_agent_core::Error) -> Self {
        match err {
            call_agent_core::Error::Telephony(msg) | call_agent_core::Error::Llm(msg) => {
                ServerError::Upstream(msg)
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ServerError::NotFound(id),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::DoNotCall(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
