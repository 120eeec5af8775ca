//! Response translation: upstream HTTP response → output item stream.
//!
//! The translation mode is fixed by the route decision and the request's
//! `stream` flag, never by looking at the response:
//!
//! | route                     | stream | output                                   |
//! |---------------------------|--------|------------------------------------------|
//! | explicit / implicit chat  | true   | one chunk per SSE event, until `[DONE]`  |
//! | explicit / implicit chat  | false  | one text item per non-empty body line    |
//! | native generate           | n/a    | one JSON item on 200, else one error item|

use futures::{stream, stream::BoxStream, StreamExt};
use reqwest::StatusCode;
use sglang_worker_protocol::{OutputItem, RouteDecision};
use tracing::{debug, warn};

use super::{error::WorkerError, lines::LineStream, route::OutboundRequest, sse::SseChunkStream};

/// Lazy, single-pass sequence of a job's output items.
///
/// Dropping it drops the upstream response and releases the connection.
pub type OutputStream = BoxStream<'static, Result<OutputItem, WorkerError>>;

pub fn translate(request: &OutboundRequest, response: reqwest::Response) -> OutputStream {
    match request.decision {
        RouteDecision::NativeGenerate => stream::once(generate_output(response)).boxed(),
        RouteDecision::ExplicitRoute | RouteDecision::ImplicitChatCompletion => {
            if request.stream {
                debug!(status = %response.status(), "Translating streamed response");
                SseChunkStream::new(response.bytes_stream()).boxed()
            } else {
                debug!(status = %response.status(), "Translating unary response");
                LineStream::new(response.bytes_stream()).boxed()
            }
        }
    }
}

/// The single output item of a native generate call.
///
/// Only `200 OK` counts as success. Any other status, including other 2xx
/// codes, is captured as an error item rather than failing the job.
async fn generate_output(response: reqwest::Response) -> Result<OutputItem, WorkerError> {
    let status = response.status();

    if status == StatusCode::OK {
        let body = response.bytes().await?;
        return Ok(OutputItem::Json(serde_json::from_slice(&body)?));
    }

    let details = response.text().await?;
    warn!(
        status = %status,
        body_preview = %details.chars().take(200).collect::<String>(),
        "Generate request failed"
    );
    Ok(OutputItem::generate_failed(status.as_u16(), details))
}
