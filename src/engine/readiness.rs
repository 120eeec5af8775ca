//! Startup gate: block until the engine answers its health check.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{Engine, EngineError, EngineResult};

/// Poll the engine until it reports healthy.
///
/// Fails if the engine process exits, or if `timeout` elapses first. Either
/// failure is fatal to the worker: no job can be served without an engine.
pub async fn wait_until_ready(
    engine: &dyn Engine,
    timeout: Duration,
    interval: Duration,
) -> EngineResult<()> {
    let start = Instant::now();
    let mut attempts: u64 = 0;

    info!(
        url = %engine.base_url(),
        timeout_secs = timeout.as_secs(),
        "Waiting for engine to become ready"
    );

    loop {
        if let Some(status) = engine.exit_status() {
            return Err(EngineError::Exited(status));
        }

        attempts += 1;
        match engine.check_health().await {
            Ok(true) => {
                info!(
                    url = %engine.base_url(),
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Engine is ready"
                );
                return Ok(());
            }
            Ok(false) => debug!(attempts, "Engine not ready yet"),
            Err(e) => warn!(attempts, error = %e, "Engine health check errored"),
        }

        if start.elapsed() + interval > timeout {
            return Err(EngineError::StartupTimeout {
                url: engine.base_url().to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}
