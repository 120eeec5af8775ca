//! Server-Sent Events decoding for streamed engine responses.
//!
//! SGLang streams chat completions in the OpenAI format:
//! ```text
//! data: {"id":"...","object":"chat.completion.chunk","choices":[...]}
//!
//! data: [DONE]
//! ```
//! Each event's data is decoded as JSON and yielded as a chunk. The `[DONE]`
//! sentinel ends the stream even if the connection stays open.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use sglang_worker_protocol::OutputItem;
use tracing::debug;

use super::{error::WorkerError, lines::LineBuffer};

/// Maximum SSE line size (1 MB) to prevent unbounded buffering when the
/// upstream sends data without line delimiters.
pub const MAX_SSE_LINE_SIZE: usize = 1024 * 1024;

pub const DONE_SENTINEL: &str = "[DONE]";

/// Assembles SSE lines into events.
#[derive(Debug, Default)]
struct EventBuilder {
    data_lines: Vec<String>,
}

impl EventBuilder {
    /// Feed one line. Returns the event's data when the line completes one.
    fn feed(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        // event, id and retry carry nothing the worker forwards
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data_lines).join("\n"))
    }
}

enum Event {
    Item(OutputItem),
    Done,
}

fn parse_event(data: String) -> Event {
    if data.trim() == DONE_SENTINEL {
        return Event::Done;
    }
    match serde_json::from_str::<Value>(&data) {
        Ok(chunk) => Event::Item(OutputItem::Chunk(chunk)),
        Err(e) => {
            debug!(error = %e, "SSE data is not JSON, forwarding as text");
            Event::Item(OutputItem::Line(data))
        }
    }
}

/// Translates an upstream SSE byte stream into chunk items, in arrival order.
///
/// The upstream stream is dropped as soon as `[DONE]` arrives or an error is
/// yielded, which releases the connection.
pub struct SseChunkStream<S> {
    inner: Option<Pin<Box<S>>>,
    lines: LineBuffer,
    event: EventBuilder,
    upstream_done: bool,
}

impl<S> SseChunkStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Some(Box::pin(inner)),
            lines: LineBuffer::with_limit(MAX_SSE_LINE_SIZE),
            event: EventBuilder::default(),
            upstream_done: false,
        }
    }

    fn terminate(&mut self) {
        self.inner = None;
        self.upstream_done = true;
    }

    /// Drain buffered lines until an event completes.
    fn next_buffered(&mut self) -> Option<Result<Event, WorkerError>> {
        while let Some(line) = self.lines.next_line() {
            match line {
                Ok(line) => {
                    if let Some(data) = self.event.feed(&line) {
                        return Some(Ok(parse_event(data)));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    /// Flush a trailing line and event once the upstream body has ended.
    fn flush(&mut self) -> Option<Result<Event, WorkerError>> {
        match self.lines.finish() {
            Some(Ok(line)) => {
                if let Some(data) = self.event.feed(&line) {
                    return Some(Ok(parse_event(data)));
                }
            }
            Some(Err(e)) => return Some(Err(e)),
            None => {}
        }
        self.event.dispatch().map(|data| Ok(parse_event(data)))
    }
}

impl<S, E> Stream for SseChunkStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<WorkerError>,
{
    type Item = Result<OutputItem, WorkerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let next = match self.next_buffered() {
                Some(next) => Some(next),
                None if self.upstream_done => {
                    let flushed = self.flush();
                    self.terminate();
                    match flushed {
                        Some(next) => Some(next),
                        None => return Poll::Ready(None),
                    }
                }
                None => None,
            };

            match next {
                Some(Ok(Event::Item(item))) => return Poll::Ready(Some(Ok(item))),
                Some(Ok(Event::Done)) => {
                    debug!("Upstream stream finished with [DONE]");
                    self.terminate();
                    self.lines = LineBuffer::new();
                    self.event = EventBuilder::default();
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    self.terminate();
                    self.lines = LineBuffer::new();
                    self.event = EventBuilder::default();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {}
            }

            let Some(inner) = self.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.lines.push(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    self.terminate();
                    self.lines = LineBuffer::new();
                    self.event = EventBuilder::default();
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => self.upstream_done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt};
    use serde_json::json;

    use super::*;

    fn sse(
        parts: Vec<&'static str>,
    ) -> SseChunkStream<impl Stream<Item = Result<Bytes, WorkerError>>> {
        SseChunkStream::new(stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        ))
    }

    async fn collect_ok(parts: Vec<&'static str>) -> Vec<OutputItem> {
        sse(parts).map(|item| item.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_chunks_in_order_until_done() {
        let items = collect_ok(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        assert_eq!(
            items,
            vec![
                OutputItem::Chunk(json!({"choices": [{"delta": {"role": "assistant"}}]})),
                OutputItem::Chunk(json!({"choices": [{"delta": {"content": "Hel"}}]})),
                OutputItem::Chunk(json!({"choices": [{"delta": {"content": "lo"}}]})),
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_after_done_is_read() {
        let items = collect_ok(vec![
            "data: {\"n\":1}\n\ndata: [DONE]\n\n",
            "data: {\"n\":2}\n\n",
        ])
        .await;
        assert_eq!(items, vec![OutputItem::Chunk(json!({"n": 1}))]);
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let whole = collect_ok(vec!["data: {\"a\":1}\n\ndata: {\"b\":2}\n\n"]).await;
        let split = collect_ok(vec![
            "da",
            "ta: {\"a\"",
            ":1}\r\n",
            "\r\ndata: {\"b\":2",
            "}\n",
            "\n",
        ])
        .await;
        assert_eq!(whole, split);
        assert_eq!(whole.len(), 2);
    }

    #[tokio::test]
    async fn test_comments_and_fields_ignored() {
        let items = collect_ok(vec![
            ": keep-alive\n\n",
            "event: message\nid: 7\nretry: 100\ndata: {\"x\":true}\n\n",
        ])
        .await;
        assert_eq!(items, vec![OutputItem::Chunk(json!({"x": true}))]);
    }

    #[tokio::test]
    async fn test_multi_line_data_is_joined() {
        let items = collect_ok(vec!["data: {\"x\":\ndata: 1}\n\n"]).await;
        assert_eq!(items, vec![OutputItem::Chunk(json!({"x": 1}))]);
    }

    #[tokio::test]
    async fn test_non_json_data_forwarded_as_text() {
        let items = collect_ok(vec!["data: plain words\n\n"]).await;
        assert_eq!(items, vec![OutputItem::Line("plain words".to_string())]);
    }

    #[tokio::test]
    async fn test_unterminated_final_event_is_flushed() {
        let items = collect_ok(vec!["data: {\"a\":1}\n\ndata: {\"b\":2}"]).await;
        assert_eq!(
            items,
            vec![
                OutputItem::Chunk(json!({"a": 1})),
                OutputItem::Chunk(json!({"b": 2}))
            ]
        );
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let parts: Vec<Result<Bytes, WorkerError>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\":1}\n\n")),
            Err(WorkerError::StreamBufferOverflow { limit: 1 }),
            Ok(Bytes::from_static(b"data: {\"b\":2}\n\n")),
        ];
        let items: Vec<_> = SseChunkStream::new(stream::iter(parts)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn test_event_builder_field_without_colon() {
        let mut builder = EventBuilder::default();
        assert_eq!(builder.feed("data"), None);
        assert_eq!(builder.feed(""), Some(String::new()));
    }
}
