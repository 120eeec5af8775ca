//! Worker configuration.
//!
//! Every option can be given on the command line or through the environment,
//! which is how serverless templates usually configure a worker image.

use std::time::Duration;

use clap::{Args, Parser};
use tracing::warn;

pub const MAX_CONCURRENCY_ENV: &str = "MAX_CONCURRENCY";
pub const DEFAULT_MAX_CONCURRENCY: usize = 300;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "sglang-worker",
    version,
    about = "Serverless job worker that routes jobs to a local SGLang engine"
)]
pub struct WorkerConfig {
    #[command(flatten)]
    pub engine: EngineConfig,

    /// Address the job server binds to.
    #[arg(long, env = "WORKER_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port the job server listens on.
    #[arg(long, env = "WORKER_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Args)]
pub struct EngineConfig {
    /// URL of an already running engine. When set, no engine process is launched.
    #[arg(long, env = "ENGINE_URL")]
    pub engine_url: Option<String>,

    /// Model to serve (local path or Hugging Face repo id).
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<String>,

    /// Name the engine serves the model under; also the default chat model.
    #[arg(long, env = "SERVED_MODEL_NAME")]
    pub served_model_name: Option<String>,

    #[arg(long = "engine-host", env = "SGLANG_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long = "engine-port", id = "engine_port", env = "SGLANG_PORT", default_value_t = 30000)]
    pub port: u16,

    /// Interpreter used to run `-m sglang.launch_server`.
    #[arg(long, env = "SGLANG_LAUNCH_PROGRAM", default_value = "python3")]
    pub launch_program: String,

    /// Extra arguments appended to the engine command line.
    #[arg(
        long = "engine-arg",
        env = "SGLANG_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true
    )]
    pub extra_args: Vec<String>,

    /// How long to wait for the engine to become healthy.
    #[arg(long, env = "ENGINE_STARTUP_TIMEOUT_SECS", default_value_t = 1200)]
    pub startup_timeout_secs: u64,

    #[arg(long, env = "ENGINE_HEALTH_INTERVAL_MS", default_value_t = 1000)]
    pub health_interval_ms: u64,
}

impl EngineConfig {
    /// Base URL of the engine, without a trailing slash.
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.engine_url {
            return url.trim_end_matches('/').to_string();
        }
        // A wildcard bind address is not connectable.
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }

    pub fn default_model(&self) -> Option<String> {
        self.served_model_name
            .clone()
            .or_else(|| self.model_path.clone())
            .filter(|m| !m.is_empty())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms.max(1))
    }
}

/// Worker-pool ceiling reported to the host runtime.
///
/// Reads `MAX_CONCURRENCY`, falling back to [`DEFAULT_MAX_CONCURRENCY`].
pub fn max_concurrency() -> usize {
    parse_max_concurrency(std::env::var(MAX_CONCURRENCY_ENV).ok().as_deref())
}

fn parse_max_concurrency(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_MAX_CONCURRENCY;
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            warn!(
                value = %raw,
                default = DEFAULT_MAX_CONCURRENCY,
                "Ignoring invalid {}", MAX_CONCURRENCY_ENV
            );
            DEFAULT_MAX_CONCURRENCY
        }
    }
}
