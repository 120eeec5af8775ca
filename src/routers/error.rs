//! Worker errors and their HTTP representation.

use std::string::FromUtf8Error;

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub const HEADER_X_WORKER_ERROR_CODE: &str = "X-Worker-Error-Code";

/// Faults that end a job. Captured native-generate failures are output items,
/// not errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Upstream body is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("Upstream body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SSE line exceeded maximum size ({limit} bytes)")]
    StreamBufferOverflow { limit: usize },
}

impl WorkerError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Upstream(e) if e.is_timeout() => "timeout",
            Self::Upstream(e) if e.is_connect() => "connection_failed",
            Self::Upstream(_) => "request_failed",
            Self::Utf8(_) => "decode_error",
            Self::Json(_) => "parse_error",
            Self::StreamBufferOverflow { .. } => "stream_buffer_overflow",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        create_error(self.status(), self.code(), self.to_string())
    }
}

/// Body shape shared with OpenAI-style gateways:
/// `{"error": {"type", "code", "message", "param"}}`.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    code: &'static str,
    message: &'a str,
    param: Option<&'a str>,
}

pub fn bad_request(code: &'static str, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, code, message)
}

/// JSON error response carrying `code` in the `X-Worker-Error-Code` header.
pub fn create_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    let message = message.into();
    let body = ErrorBody {
        error: ErrorDetail {
            kind: status.canonical_reason().unwrap_or("Unknown Status Code"),
            code,
            message: &message,
            param: None,
        },
    };

    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(HEADER_X_WORKER_ERROR_CODE, HeaderValue::from_static(code));
    (status, headers, Json(body)).into_response()
}

pub fn extract_error_code_from_response<B>(response: &Response<B>) -> &str {
    response
        .headers()
        .get(HEADER_X_WORKER_ERROR_CODE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_error_sets_code_header() {
        let response = bad_request("invalid_job", "Job envelope must carry an input mapping");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(extract_error_code_from_response(&response), "invalid_job");
    }

    #[test]
    fn test_worker_error_mapping() {
        let err = WorkerError::StreamBufferOverflow { limit: 1024 };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        let response = err.into_response();
        assert_eq!(
            extract_error_code_from_response(&response),
            "stream_buffer_overflow"
        );

        let err: WorkerError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "parse_error");
    }

    #[test]
    fn test_missing_code_header_is_empty() {
        let response = Response::new(());
        assert_eq!(extract_error_code_from_response(&response), "");
    }
}
