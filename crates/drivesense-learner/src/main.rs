//! DriveSense Service Binary
//!
//! Runs the learner with its HTTP/WebSocket adapter.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use drivesense_learner::{
    api::{self, AppState},
    BroadcastSink, DriveSenseConfig, Engine, Metrics, Runtime, SessionClock, TracingSink,
};

/// Outbound broadcast buffer
const OUTBOUND_BUFFER: usize = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DriveSenseConfig::load()?;
    init_tracing(&config)?;

    info!("Starting DriveSense v{}", drivesense_common::VERSION);
    info!(
        learning_period_secs = config.learning.learning_period_secs,
        tick_interval_secs = config.learning.tick_interval_secs,
        publish_threshold = config.learning.publish_threshold,
        max_per_session = config.learning.max_recommendations_per_session,
        "Loaded configuration"
    );

    let registry = Registry::new();
    let metrics = Arc::new(Metrics::new().context("creating metrics")?);
    metrics.register(&registry).context("registering metrics")?;

    let clock = SessionClock::start(config.learning.learning_period());
    let observer = Arc::new(TracingSink::new(metrics));
    let engine = Arc::new(Engine::new(config.clone(), clock, observer)?);

    let outbound = BroadcastSink::new(OUTBOUND_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runtime = Runtime::spawn(Arc::clone(&engine), Arc::new(outbound.clone()), shutdown_rx);

    let app = api::router(AppState {
        engine,
        runtime: runtime.handle(),
        outbound,
        registry,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("DriveSense listening on {}", addr);
    info!("Endpoints: /health, /metrics, /v1/actions, /v1/feedback, /v1/suggestions, /v1/status, /v1/recommendations/ws");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let _ = shutdown_tx.send(true);
    runtime.join().await;

    info!("Shutting down DriveSense");
    Ok(())
}

fn init_tracing(config: &DriveSenseConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.telemetry.log_level))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.telemetry.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    Ok(())
}
