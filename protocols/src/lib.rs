//! Protocol types for the SGLang serverless worker.
//!
//! Shared between the worker binary and anything that builds or inspects jobs:
//! - [`job`]: job envelopes, request variants and route decisions
//! - [`content`]: multimodal content parts and their normalization
//! - [`output`]: items yielded back to the host runtime

pub mod content;
pub mod job;
pub mod output;

pub use content::{normalize_content, normalize_messages, normalize_part, ContentPart};
pub use job::{stream_requested, Job, JobRequest, RouteDecision};
pub use output::OutputItem;
