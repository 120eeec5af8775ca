use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sgl_worker::{
    config::{self, WorkerConfig},
    engine::{self, Engine, LocalEngine, RemoteEngine},
    observability,
    routers::JobHandler,
    server::{self, AppState},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::parse();
    observability::init_tracing(&config.log_level, config.json_logs);

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let engine: Arc<dyn Engine> = if config.engine.engine_url.is_some() {
        Arc::new(RemoteEngine::attach(&config.engine, client.clone())?)
    } else {
        Arc::new(LocalEngine::launch(&config.engine, client.clone())?)
    };

    engine::wait_until_ready(
        &*engine,
        config.engine.startup_timeout(),
        config.engine.health_interval(),
    )
    .await
    .context("engine did not become ready")?;

    let max_concurrency = config::max_concurrency();
    let app = server::build_app(AppState::new(
        JobHandler::new(engine.clone(), client),
        max_concurrency,
    ));

    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.bind, config.port))?;
    info!(
        addr = %listener.local_addr()?,
        engine_url = %engine.base_url(),
        max_concurrency,
        "Worker ready to accept jobs"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("job server failed")?;

    info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
