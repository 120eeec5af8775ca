//! Engine handles: attached by URL, or launched as a child process.

use std::{
    process::{ExitStatus, Stdio},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{Engine, EngineError, EngineResult};
use crate::config::EngineConfig;

const HEALTH_PATH: &str = "/health";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const LAUNCH_MODULE: &str = "sglang.launch_server";

/// An engine that is already running somewhere reachable over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteEngine {
    base_url: String,
    model: Option<String>,
    client: Client,
}

impl RemoteEngine {
    pub fn new(base_url: impl Into<String>, model: Option<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            model: model.filter(|m| !m.is_empty()),
            client,
        }
    }

    /// Attach to the engine at `config.engine_url`.
    pub fn attach(config: &EngineConfig, client: Client) -> EngineResult<Self> {
        let url = config
            .engine_url
            .as_deref()
            .ok_or_else(|| EngineError::Config("engine URL is not set".to_string()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::Config(format!(
                "engine URL must start with http:// or https://, got '{}'",
                url
            )));
        }
        info!(url = %url, "Attaching to running engine");
        Ok(Self::new(url, config.default_model(), client))
    }
}

#[async_trait]
impl Engine for RemoteEngine {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn check_health(&self) -> EngineResult<bool> {
        let health_url = self.endpoint_url(HEALTH_PATH);

        match self
            .client
            .get(&health_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                debug!(url = %health_url, status = %resp.status(), "Engine health check not ready");
                Ok(false)
            }
            Err(e) if e.is_connect() || e.is_timeout() => {
                debug!(url = %health_url, error = %e, "Engine not reachable yet");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// An SGLang server process owned by this worker.
///
/// The process is killed when the handle is dropped.
#[derive(Debug)]
pub struct LocalEngine {
    endpoint: RemoteEngine,
    child: Mutex<Child>,
}

impl LocalEngine {
    pub fn launch(config: &EngineConfig, client: Client) -> EngineResult<Self> {
        let model_path = config.model_path.as_deref().ok_or_else(|| {
            EngineError::Config("a model path is required to launch the engine".to_string())
        })?;

        let args = launch_args(config, model_path);
        info!(
            program = %config.launch_program,
            args = ?args,
            "Launching SGLang engine"
        );

        let child = Command::new(&config.launch_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: config.launch_program.clone(),
                source,
            })?;

        Ok(Self {
            endpoint: RemoteEngine::new(config.base_url(), config.default_model(), client),
            child: Mutex::new(child),
        })
    }
}

#[async_trait]
impl Engine for LocalEngine {
    fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    fn model(&self) -> Option<&str> {
        self.endpoint.model()
    }

    async fn check_health(&self) -> EngineResult<bool> {
        self.endpoint.check_health().await
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        let mut child = match self.child.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Failed to poll engine process status");
                None
            }
        }
    }
}

/// Command-line arguments for `python -m sglang.launch_server`.
fn launch_args(config: &EngineConfig, model_path: &str) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        LAUNCH_MODULE.to_string(),
        "--model-path".to_string(),
        model_path.to_string(),
        "--host".to_string(),
        config.host.clone(),
        "--port".to_string(),
        config.port.to_string(),
    ];
    if let Some(name) = &config.served_model_name {
        args.push("--served-model-name".to_string());
        args.push(name.clone());
    }
    args.extend(config.extra_args.iter().filter(|a| !a.is_empty()).cloned());
    args
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::config::WorkerConfig;

    fn engine_config(args: &[&str]) -> EngineConfig {
        let argv = std::iter::once("sglang-worker").chain(args.iter().copied());
        WorkerConfig::parse_from(argv).engine
    }

    #[test]
    fn test_launch_args() {
        let config = engine_config(&[
            "--model-path",
            "Qwen/Qwen2.5-0.5B-Instruct",
            "--served-model-name",
            "qwen",
            "--engine-port",
            "31000",
            "--engine-arg=--tp",
            "--engine-arg=2",
        ]);
        let args = launch_args(&config, "Qwen/Qwen2.5-0.5B-Instruct");
        assert_eq!(
            args,
            vec![
                "-m",
                "sglang.launch_server",
                "--model-path",
                "Qwen/Qwen2.5-0.5B-Instruct",
                "--host",
                "0.0.0.0",
                "--port",
                "31000",
                "--served-model-name",
                "qwen",
                "--tp",
                "2",
            ]
        );
    }

    #[test]
    fn test_launch_requires_model_path() {
        let config = engine_config(&[]);
        let err = LocalEngine::launch(&config, Client::new()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_remote_engine_trims_trailing_slash() {
        let engine =
            RemoteEngine::new("http://10.0.0.2:30000/", Some(String::new()), Client::new());
        assert_eq!(engine.base_url(), "http://10.0.0.2:30000");
        assert_eq!(engine.endpoint_url("/generate"), "http://10.0.0.2:30000/generate");
        assert_eq!(engine.model(), None);
    }

    #[test]
    fn test_attach_rejects_non_http_url() {
        let config = engine_config(&["--engine-url", "grpc://10.0.0.2:30001"]);
        let err = RemoteEngine::attach(&config, Client::new()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
