//! Inference engine lifecycle.
//!
//! The worker talks to exactly one SGLang engine. It is either launched as a
//! child process ([`LocalEngine`]) or attached to by URL ([`RemoteEngine`]).
//! Either way, [`wait_until_ready`] gates job processing until the engine's
//! health endpoint answers.

mod local;
mod readiness;

use std::{fmt, process::ExitStatus};

use async_trait::async_trait;
use thiserror::Error;

pub use local::{LocalEngine, RemoteEngine};
pub use readiness::wait_until_ready;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine configuration error: {0}")]
    Config(String),

    #[error("Failed to launch engine process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine process exited before becoming ready: {0}")]
    Exited(ExitStatus),

    #[error("Engine at {url} not ready after {timeout_secs}s")]
    StartupTimeout { url: String, timeout_secs: u64 },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Handle to the inference engine every job is routed to.
#[async_trait]
pub trait Engine: Send + Sync + fmt::Debug {
    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:30000`.
    fn base_url(&self) -> &str;

    /// Model id used when a chat request does not name one.
    fn model(&self) -> Option<&str>;

    /// Probe the engine once. `Ok(false)` means reachable but not ready.
    async fn check_health(&self) -> EngineResult<bool>;

    /// Exit status of the engine process, if it was launched by us and has
    /// already terminated.
    fn exit_status(&self) -> Option<ExitStatus> {
        None
    }

    fn endpoint_url(&self, route: &str) -> String {
        format!("{}{}", self.base_url(), route)
    }
}
