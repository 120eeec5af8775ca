//! Line framing over an upstream byte stream.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use sglang_worker_protocol::OutputItem;

use super::error::WorkerError;

/// Accumulates bytes and splits them into `\n`-terminated lines.
///
/// Bytes are buffered undecoded so a UTF-8 sequence split across network
/// chunks is decoded intact. A trailing `\r` is stripped from every line.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to contain no newline.
    scanned: usize,
    limit: usize,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// A buffer that refuses to hold an unterminated line longer than `limit`.
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, if one is buffered.
    pub(crate) fn next_line(&mut self) -> Option<Result<String, WorkerError>> {
        match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                self.scanned = 0;
                Some(decode_line(line))
            }
            None => {
                self.scanned = self.buf.len();
                if self.buf.len() > self.limit {
                    return Some(Err(WorkerError::StreamBufferOverflow { limit: self.limit }));
                }
                None
            }
        }
    }

    /// Whatever is left once the upstream body has ended.
    pub(crate) fn finish(&mut self) -> Option<Result<String, WorkerError>> {
        if self.buf.is_empty() {
            return None;
        }
        self.scanned = 0;
        Some(decode_line(std::mem::take(&mut self.buf)))
    }
}

fn decode_line(mut line: Vec<u8>) -> Result<String, WorkerError> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8(line)?)
}

/// Yields each non-empty line of a unary response body as
/// [`OutputItem::Line`], verbatim, without JSON parsing.
pub struct LineStream<S> {
    inner: Pin<Box<S>>,
    lines: LineBuffer,
    upstream_done: bool,
}

impl<S> LineStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Box::pin(inner),
            lines: LineBuffer::new(),
            upstream_done: false,
        }
    }
}

impl<S, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<WorkerError>,
{
    type Item = Result<OutputItem, WorkerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            while let Some(line) = self.lines.next_line() {
                match line {
                    Ok(line) if line.is_empty() => continue,
                    Ok(line) => return Poll::Ready(Some(Ok(OutputItem::Line(line)))),
                    Err(e) => return Poll::Ready(Some(Err(e))),
                }
            }

            if self.upstream_done {
                return match self.lines.finish() {
                    Some(Ok(line)) if !line.is_empty() => {
                        Poll::Ready(Some(Ok(OutputItem::Line(line))))
                    }
                    Some(Err(e)) => Poll::Ready(Some(Err(e))),
                    _ => Poll::Ready(None),
                };
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.lines.push(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    self.upstream_done = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => self.upstream_done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
