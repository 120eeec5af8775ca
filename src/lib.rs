//! SGLang serverless worker.
//!
//! Accepts serverless jobs, routes each to one of the engine's HTTP endpoints
//! (`/v1/chat/completions`, a caller-chosen OpenAI route, or native
//! `/generate`), and translates the engine's response into the output items
//! the host runtime collects.

pub mod config;
pub mod engine;
pub mod observability;
pub mod routers;
pub mod server;

pub use sglang_worker_protocol as protocols;
