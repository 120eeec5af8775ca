//! Request routing: job input → outbound engine request.
//!
//! Pure. Nothing here performs I/O; the caller sends the [`OutboundRequest`].

use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use sglang_worker_protocol::{
    job::{MESSAGES_FIELD, MODEL_FIELD},
    normalize_messages, stream_requested, JobRequest, RouteDecision,
};
use tracing::debug;

use crate::engine::Engine;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const GENERATE_PATH: &str = "/generate";
/// Model id sent when neither the job nor the engine names one.
pub const FALLBACK_MODEL: &str = "default";

/// A fully built request to the engine.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub decision: RouteDecision,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
    /// Whether the response will be an incremental event stream. Always
    /// false for native generate.
    pub stream: bool,
}

/// Classify a job input and build the request it maps to.
///
/// Never fails: input that is neither an explicit route nor a chat request is
/// forwarded verbatim to `/generate`, and any problem surfaces upstream.
pub fn route_job(engine: &dyn Engine, input: Value) -> OutboundRequest {
    let request = JobRequest::parse(input);
    let decision = request.decision();

    let (url, body) = match request {
        JobRequest::Explicit { route, mut input } => {
            if let Some(messages) = input.get_mut(MESSAGES_FIELD) {
                normalize_messages(messages);
            }
            (engine.endpoint_url(&route), input)
        }
        JobRequest::ChatCompletion { mut body } => {
            if let Some(messages) = body.get_mut(MESSAGES_FIELD) {
                normalize_messages(messages);
            }
            if !body.contains_key(MODEL_FIELD) {
                let model = engine
                    .model()
                    .filter(|m| !m.is_empty())
                    .unwrap_or(FALLBACK_MODEL);
                body.insert(MODEL_FIELD.to_string(), Value::from(model));
            }
            (
                engine.endpoint_url(CHAT_COMPLETIONS_PATH),
                Value::Object(body),
            )
        }
        JobRequest::Generate { body } => (engine.endpoint_url(GENERATE_PATH), body),
    };

    let stream = decision.supports_streaming() && stream_requested(&body);
    debug!(route = %decision, url = %url, stream, "Routed job");

    OutboundRequest {
        decision,
        url,
        headers: json_headers(),
        body,
        stream,
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}
