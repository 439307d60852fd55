//! HTTP Endpoints
//!
//! Router for the call agent: telephony webhooks, the per-call media socket,
//! the outbound dialer and operational endpoints.

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dialer::{get_call, place_call};
use crate::media_ws::media_ws_handler;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::webhooks::handle_telephony_webhook;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        // Telephony
        .route("/webhooks/telephony", post(handle_telephony_webhook))
        .route("/ws/calls/:call_id", get(media_ws_handler))
        // Calls
        .route("/api/calls", post(place_call))
        .route("/api/calls/:id", get(get_call))
        // Operations
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - disabled: permissive
/// - no valid origins: localhost:3000 only
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": state.lifecycle.active_count(),
        "llm": state.deps.llm.model_name(),
        "stt": state.stt.model_name(),
        "tts": state.deps.tts.model_name(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_state, fakes, MockTelephony};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(app_state(&fakes(MockTelephony::default())))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_calls"], 0);
    }

    #[tokio::test]
    async fn test_webhook_always_acknowledged() {
        let request = Request::post("/webhooks/telephony")
            .body(Body::from("not json"))
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_place_call_rejects_do_not_call() {
        let request = post_json(
            "/api/calls",
            serde_json::json!({"agent_id": "p1", "to_number": "+15550009999"}),
        );
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["detail"], "Number +15550009999 is on the Do Not Call list");
    }

    #[tokio::test]
    async fn test_place_call_unknown_agent() {
        let request = post_json(
            "/api/calls",
            serde_json::json!({"agent_id": "nobody", "to_number": "+15550001111"}),
        );
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_place_call_created() {
        let request = post_json(
            "/api/calls",
            serde_json::json!({
                "agent_id": "p1",
                "to_number": "+15550001111",
                "contact_name": "Dana"
            }),
        );
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["contact_name"], "Dana");
    }

    #[tokio::test]
    async fn test_get_unknown_call() {
        let response = router()
            .oneshot(Request::get("/api/calls/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
