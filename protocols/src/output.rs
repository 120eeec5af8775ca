//! Items yielded back to the host runtime for one job.

use serde::Serialize;
use serde_json::Value;

/// One element of a job's output sequence.
///
/// Serialized untagged: a line is a JSON string, JSON bodies and stream chunks
/// are emitted as-is, and a captured failure is `{"error", "details"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputItem {
    /// One non-empty decoded line of a unary chat or explicit-route body.
    Line(String),
    /// The parsed body of a successful native generate call.
    Json(Value),
    /// One event of an incremental stream.
    Chunk(Value),
    /// A native generate call that returned a non-success status.
    Error { error: String, details: String },
}

impl OutputItem {
    pub fn generate_failed(status: u16, details: impl Into<String>) -> Self {
        Self::Error {
            error: format!("Generate request failed with status code {}", status),
            details: details.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
