//! Multimodal message content parts.
//!
//! Chat messages reach the worker with `content` in whatever shape the caller
//! chose: a plain string, a list of typed parts, a list mixing parts with bare
//! scalars, or something else entirely. [`normalize_content`] reshapes every
//! one of those into an ordered list of [`ContentPart`]s that the engine's
//! OpenAI-compatible endpoint accepts.
//!
//! Image payloads are never inspected: a `data:image/...;base64,...` URI and a
//! remote URL are both just strings here.

use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const TEXT_PART_TYPE: &str = "text";
pub const IMAGE_URL_PART_TYPE: &str = "image_url";

/// One normalized element of a message's `content`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// `{"type": "text", "text": ...}`
    Text { text: String },
    /// `{"type": "image_url", "image_url": {"url": ...}}`
    ImageUrl { url: String },
    /// A mapping reproduced exactly as received: unknown part types, or known
    /// types carrying extra fields such as `detail` or `cache_control`.
    Passthrough(Map<String, Value>),
}

/// Owned view of a mapping's shape, computed before the mapping is consumed.
enum PartShape {
    Text(String),
    ImageUrl(String),
    Opaque,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl { url: url.into() }
    }

    /// The `type` tag of this part, if it has one.
    pub fn part_type(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => Some(TEXT_PART_TYPE),
            Self::ImageUrl { .. } => Some(IMAGE_URL_PART_TYPE),
            Self::Passthrough(map) => map.get("type").and_then(Value::as_str),
        }
    }

    fn from_map(map: Map<String, Value>) -> Self {
        match PartShape::of(&map) {
            PartShape::Text(text) => Self::Text { text },
            PartShape::ImageUrl(url) => Self::ImageUrl { url },
            PartShape::Opaque => Self::Passthrough(map),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Text { text } => {
                let mut map = Map::with_capacity(2);
                map.insert("type".into(), Value::from(TEXT_PART_TYPE));
                map.insert("text".into(), Value::String(text));
                Value::Object(map)
            }
            Self::ImageUrl { url } => {
                let mut inner = Map::with_capacity(1);
                inner.insert("url".into(), Value::String(url));
                let mut map = Map::with_capacity(2);
                map.insert("type".into(), Value::from(IMAGE_URL_PART_TYPE));
                map.insert("image_url".into(), Value::Object(inner));
                Value::Object(map)
            }
            Self::Passthrough(map) => Value::Object(map),
        }
    }
}

impl PartShape {
    fn of(map: &Map<String, Value>) -> Self {
        match map.get("type").and_then(Value::as_str) {
            Some(IMAGE_URL_PART_TYPE) => match map.get("image_url") {
                // A bare string is wrapped; any extra keys on the part are
                // dropped along with the old shape.
                Some(Value::String(url)) => Self::ImageUrl(url.clone()),
                Some(Value::Object(inner)) if map.len() == 2 && inner.len() == 1 => {
                    match inner.get("url") {
                        Some(Value::String(url)) => Self::ImageUrl(url.clone()),
                        _ => Self::Opaque,
                    }
                }
                _ => Self::Opaque,
            },
            Some(TEXT_PART_TYPE) if map.len() == 2 => match map.get("text") {
                Some(Value::String(text)) => Self::Text(text.clone()),
                _ => Self::Opaque,
            },
            _ => Self::Opaque,
        }
    }
}

impl From<ContentPart> for Value {
    fn from(part: ContentPart) -> Self {
        part.into_value()
    }
}

impl Serialize for ContentPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text { text } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", TEXT_PART_TYPE)?;
                map.serialize_entry("text", text)?;
                map.end()
            }
            Self::ImageUrl { url } => {
                #[derive(Serialize)]
                struct ImageUrl<'a> {
                    url: &'a str,
                }

                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", IMAGE_URL_PART_TYPE)?;
                map.serialize_entry("image_url", &ImageUrl { url })?;
                map.end()
            }
            Self::Passthrough(inner) => inner.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(normalize_part)
    }
}

/// Normalize a message's `content` into an ordered list of parts.
///
/// Total: every input shape maps to a defined output and nothing is dropped.
/// - a list is normalized element by element (see [`normalize_part`])
/// - a string `s` becomes `[{"type": "text", "text": s}]`
/// - anything else becomes a single text part holding its string form
pub fn normalize_content(content: Value) -> Vec<ContentPart> {
    match content {
        Value::Array(items) => items.into_iter().map(normalize_part).collect(),
        Value::String(text) => vec![ContentPart::text(text)],
        other => vec![ContentPart::text(display_string(&other))],
    }
}

/// Normalize one element of a content list.
///
/// Mappings are kept as they are, except an `image_url` part whose `image_url`
/// is a bare string, which is wrapped as `{"url": <string>}`. Non-mapping
/// elements are coerced to text parts.
pub fn normalize_part(item: Value) -> ContentPart {
    match item {
        Value::Object(map) => ContentPart::from_map(map),
        other => ContentPart::text(display_string(&other)),
    }
}

/// Rewrite the `content` of every message in a `messages` list in place.
///
/// Messages that are not mappings, or that carry no `content` key, are left
/// untouched. Returns the number of messages rewritten.
pub fn normalize_messages(messages: &mut Value) -> usize {
    let Some(messages) = messages.as_array_mut() else {
        return 0;
    };

    let mut rewritten = 0;
    for message in messages.iter_mut() {
        let Some(content) = message.as_object_mut().and_then(|m| m.get_mut("content")) else {
            continue;
        };
        let parts = normalize_content(content.take());
        *content = Value::Array(parts.into_iter().map(ContentPart::into_value).collect());
        rewritten += 1;
    }
    rewritten
}

/// String form of a non-string value: its compact JSON rendering.
fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
