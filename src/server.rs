//! Job server: the boundary with the host runtime.
//!
//! Jobs arrive as `{"id"?: string, "input": {...}}` envelopes. `/runsync`
//! aggregates every output item into one response; `/stream` forwards items
//! as they are produced, one SSE `data:` frame each.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::{future, stream, StreamExt};
use serde_json::{json, Value};
use sglang_worker_protocol::{Job, OutputItem};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument, Span};

use crate::routers::{
    error::{self as router_error, WorkerError},
    JobHandler, OutputStream,
};

pub const HEADER_X_JOB_ID: &str = "x-job-id";

#[derive(Debug, Clone)]
pub struct AppState {
    handler: JobHandler,
    max_concurrency: usize,
    job_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(handler: JobHandler, max_concurrency: usize) -> Arc<Self> {
        let max_concurrency = max_concurrency.max(1);
        Arc::new(Self {
            handler,
            max_concurrency,
            job_slots: Arc::new(Semaphore::new(max_concurrency)),
        })
    }

    /// Wait for a job slot. The slot is held until the permit drops, which for
    /// `/stream` is when the response body finishes or is abandoned.
    #[allow(clippy::result_large_err)]
    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, Response> {
        self.job_slots.clone().acquire_owned().await.map_err(|_| {
            router_error::create_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "worker_shutting_down",
                "Worker is shutting down",
            )
        })
    }
}

/// A validated job envelope.
#[derive(Debug)]
struct AcceptedJob {
    id: String,
    id_header: HeaderValue,
    input: Value,
}

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/runsync", post(run_sync))
        .route("/stream", post(run_stream))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "engine_url": state.handler.engine().base_url(),
        "max_concurrency": state.max_concurrency,
    }))
}

async fn run_sync(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let job = match parse_job(payload) {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    let span = tracing::info_span!("job", job_id = %job.id);

    async move {
        let _permit = match state.acquire_slot().await {
            Ok(permit) => permit,
            Err(resp) => return resp,
        };

        let mut output_stream = match state.handler.handle(job.input).await {
            Ok(s) => s,
            Err(e) => return e.into_response(),
        };

        let mut output = Vec::new();
        while let Some(item) = output_stream.next().await {
            match item {
                Ok(item) => output.push(item),
                Err(e) => {
                    warn!(error = %e, items = output.len(), "Job failed mid-stream");
                    return e.into_response();
                }
            }
        }

        info!(items = output.len(), "Job completed");
        Json(json!({
            "id": job.id,
            "status": "COMPLETED",
            "output": output,
        }))
        .into_response()
    }
    .instrument(span)
    .await
}

async fn run_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let job = match parse_job(payload) {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    let span = tracing::info_span!("job", job_id = %job.id);

    let permit = match state.acquire_slot().instrument(span.clone()).await {
        Ok(permit) => permit,
        Err(resp) => return resp,
    };
    let output_stream = match state.handler.handle(job.input).instrument(span.clone()).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };

    let body = Body::from_stream(sse_frames(output_stream, span, permit));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::HeaderName::from_static(HEADER_X_JOB_ID), job.id_header),
        ],
        body,
    )
        .into_response()
}

/// Validate the envelope. The input itself is not checked here; any mapping
/// is routable. A missing id is generated.
#[allow(clippy::result_large_err)]
fn parse_job(payload: Result<Json<Value>, JsonRejection>) -> Result<AcceptedJob, Response> {
    let Json(value) =
        payload.map_err(|e| router_error::bad_request("invalid_json", e.body_text()))?;

    let job: Job = serde_json::from_value(value).map_err(|e| {
        router_error::bad_request("invalid_job", format!("Invalid job envelope: {}", e))
    })?;
    if !job.input.is_object() {
        return Err(router_error::bad_request(
            "invalid_job",
            "Job input must be a JSON object",
        ));
    }

    let id = job.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    // The id is echoed in a response header.
    let id_header = HeaderValue::from_str(&id).map_err(|_| {
        router_error::bad_request(
            "invalid_job",
            "Job id must contain only visible ASCII characters",
        )
    })?;

    Ok(AcceptedJob {
        id,
        id_header,
        input: job.input,
    })
}

/// SSE framing of an output stream. A fault becomes an `error` event and ends
/// the stream; `data: [DONE]` always closes it. The job slot is released when
/// the returned stream is dropped.
fn sse_frames(
    output: OutputStream,
    span: Span,
    permit: OwnedSemaphorePermit,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    output
        .scan(false, move |failed, item| {
            if *failed {
                return future::ready(None);
            }
            let frame = match item {
                Ok(item) => format_data_frame(&item),
                Err(e) => {
                    *failed = true;
                    let _enter = span.enter();
                    warn!(error = %e, "Job failed mid-stream");
                    format_error_frame(&e)
                }
            };
            future::ready(Some(Ok(frame)))
        })
        .chain(stream::once(future::ready(Ok(Bytes::from_static(
            b"data: [DONE]\n\n",
        )))))
        .map(move |frame| {
            let _slot = &permit;
            frame
        })
}

fn format_data_frame(item: &OutputItem) -> Bytes {
    let json = serde_json::to_string(item).unwrap_or_else(|_| "null".to_string());
    Bytes::from(format!("data: {}\n\n", json))
}

fn format_error_frame(err: &WorkerError) -> Bytes {
    let data = json!({
        "error": {
            "type": "worker_error",
            "code": err.code(),
            "message": err.to_string(),
        }
    });
    Bytes::from(format!("event: error\ndata: {}\n\n", data))
}
