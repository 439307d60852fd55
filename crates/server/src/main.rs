//! Call Agent Server Entry Point

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use call_agent_agent::OrchestratorDeps;
use call_agent_config::{load_settings, Settings};
use call_agent_llm::{OpenAIBackend, OpenAIConfig};
use call_agent_persistence::{InMemoryCallRecords, InMemorySessionStore, StaticProfileSource};
use call_agent_pipeline::{HttpStt, HttpTts};
use call_agent_server::{create_router, init_metrics, AppState, CallControlClient, CallControlConfig};
use call_agent_tools::{create_registry, ToolDispatcher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("CALL_AGENT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not up yet
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!("Starting Call Agent Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled && init_metrics().is_some() {
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let sessions = Arc::new(InMemorySessionStore::from_config(&config.session));
    let _cleanup = sessions.start_cleanup_task(Duration::from_secs(
        config.session.cleanup_interval_secs.max(1),
    ));

    let llm = OpenAIBackend::new(OpenAIConfig::from_settings(&config.llm))?;
    let stt = HttpStt::new((&config.speech).into())?;
    let tts = HttpTts::new((&config.speech).into())?;
    let telephony = CallControlClient::new(CallControlConfig::from_settings(&config))?;

    let registry = create_registry(&config.tools)?;
    tracing::info!(tools = registry.len(), "Tool registry ready");
    let tools = ToolDispatcher::new(
        Arc::new(registry),
        Duration::from_secs(config.limits.tool_timeout_secs),
    );

    tracing::info!(
        profiles = config.profiles.len(),
        llm = %config.llm.model,
        "Initialized call runtime dependencies"
    );

    let deps = OrchestratorDeps {
        sessions,
        records: Arc::new(InMemoryCallRecords::new()),
        profiles: Arc::new(StaticProfileSource::new(config.profiles.clone())),
        llm: Arc::new(llm),
        tts: Arc::new(tts),
        tools,
        telephony: Arc::new(telephony),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, deps, Arc::new(stt));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("call_agent={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
