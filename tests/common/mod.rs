//! Shared helpers for integration tests: a wiremock stand-in for the SGLang
//! engine and a job handler wired to it.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::StreamExt;
use sgl_worker::{
    engine::RemoteEngine,
    protocols::OutputItem,
    routers::{JobHandler, OutputStream, WorkerError},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use wiremock::MockServer;

pub const ENGINE_MODEL: &str = "HuggingFaceTB/SmolLM2-1.7B-Instruct";

pub async fn mock_engine() -> MockServer {
    MockServer::start().await
}

pub fn handler_for(server: &MockServer, model: Option<&str>) -> JobHandler {
    handler_at(&server.uri(), model)
}

pub fn handler_at(url: &str, model: Option<&str>) -> JobHandler {
    let engine = RemoteEngine::new(url, model.map(str::to_string), reqwest::Client::new());
    JobHandler::new(Arc::new(engine), reqwest::Client::new())
}

pub async fn collect(stream: OutputStream) -> Vec<Result<OutputItem, WorkerError>> {
    stream.collect().await
}

pub async fn collect_ok(stream: OutputStream) -> Vec<OutputItem> {
    stream
        .map(|item| item.expect("output item"))
        .collect()
        .await
}

/// An SSE body as SGLang streams chat completions.
pub fn sse_body(chunks: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(&chunk.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// A bare TCP engine that answers every request with `200` and a chunked
/// `text/event-stream` body, then keeps the connection open until the client
/// closes it.
pub struct HeldOpenEngine {
    pub url: String,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl HeldOpenEngine {
    pub async fn start(body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let (accepted_tx, closed_tx) = (accepted.clone(), closed.clone());
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted_tx.fetch_add(1, Ordering::SeqCst);
                let closed = closed_tx.clone();
                tokio::spawn(async move {
                    serve_held_open(socket, body).await;
                    closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            url,
            accepted,
            closed,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait up to five seconds for `n` connections to have been closed by
    /// the client.
    pub async fn wait_for_closed(&self, n: usize) -> bool {
        for _ in 0..500 {
            if self.closed() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn serve_held_open(mut socket: TcpStream, body: &str) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         content-type: text/event-stream\r\n\
         transfer-encoding: chunked\r\n\r\n\
         {:x}\r\n{}\r\n",
        body.len(),
        body
    );
    if socket.write_all(response.as_bytes()).await.is_err() {
        return;
    }

    // Never send the terminating chunk; wait for the client to hang up.
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}
