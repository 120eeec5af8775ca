//! Inbound job payloads and their route classification.
//!
//! The host runtime hands the worker an untyped `input` mapping. It is parsed
//! exactly once into a [`JobRequest`], whose variant fixes both the upstream
//! endpoint and how the upstream response is translated.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const OPENAI_ROUTE_FIELD: &str = "openai_route";
pub const OPENAI_INPUT_FIELD: &str = "openai_input";
pub const MESSAGES_FIELD: &str = "messages";
pub const MODEL_FIELD: &str = "model";
pub const STREAM_FIELD: &str = "stream";

/// Job envelope as delivered by the host runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Correlation id assigned by the host; generated locally when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub input: Value,
}

/// Which backend call shape a job resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    /// Caller named the path (`openai_route`) and body (`openai_input`).
    ExplicitRoute,
    /// Caller sent chat `messages` without a wrapper.
    ImplicitChatCompletion,
    /// Everything else goes to the engine's native `/generate`.
    NativeGenerate,
}

impl RouteDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitRoute => "explicit_route",
            Self::ImplicitChatCompletion => "implicit_chat_completion",
            Self::NativeGenerate => "native_generate",
        }
    }

    /// Whether the upstream response may be an incremental stream.
    ///
    /// Native generate calls are always unary.
    pub fn supports_streaming(&self) -> bool {
        !matches!(self, Self::NativeGenerate)
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job input parsed into one of the three request variants.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    Explicit { route: String, input: Value },
    ChatCompletion { body: Map<String, Value> },
    /// Named fallback: any input that is neither of the above, including
    /// inputs that are not mappings at all.
    Generate { body: Value },
}

impl JobRequest {
    /// Classify a job input. Never fails.
    ///
    /// Precedence, first match wins:
    /// 1. `openai_route` is a non-empty string and `openai_input` is present
    /// 2. a `messages` key is present
    /// 3. anything else
    pub fn parse(input: Value) -> Self {
        let mut map = match input {
            Value::Object(map) => map,
            other => return Self::Generate { body: other },
        };

        let route = map
            .get(OPENAI_ROUTE_FIELD)
            .and_then(Value::as_str)
            .filter(|route| !route.is_empty())
            .map(str::to_owned);
        let has_input = map
            .get(OPENAI_INPUT_FIELD)
            .is_some_and(|input| !input.is_null());

        if let (Some(route), true) = (route, has_input) {
            let input = map.remove(OPENAI_INPUT_FIELD).unwrap_or_default();
            return Self::Explicit { route, input };
        }

        if map.contains_key(MESSAGES_FIELD) {
            return Self::ChatCompletion { body: map };
        }

        Self::Generate {
            body: Value::Object(map),
        }
    }

    pub fn decision(&self) -> RouteDecision {
        match self {
            Self::Explicit { .. } => RouteDecision::ExplicitRoute,
            Self::ChatCompletion { .. } => RouteDecision::ImplicitChatCompletion,
            Self::Generate { .. } => RouteDecision::NativeGenerate,
        }
    }
}

/// Whether a request body asks for incremental streaming.
pub fn stream_requested(body: &Value) -> bool {
    body.get(STREAM_FIELD)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
