//! Per-job execution: route, send the one upstream request, translate.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    error::WorkerError,
    route::{route_job, OutboundRequest},
    streaming::{translate, OutputStream},
};
use crate::engine::Engine;

/// Runs jobs against one engine. Cheap to clone; clones share the HTTP
/// client's connection pool.
#[derive(Debug, Clone)]
pub struct JobHandler {
    engine: Arc<dyn Engine>,
    client: reqwest::Client,
}

impl JobHandler {
    pub fn new(engine: Arc<dyn Engine>, client: reqwest::Client) -> Self {
        Self { engine, client }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Handle one job input.
    ///
    /// Exactly one upstream request is made and it is never retried. A
    /// transport failure is returned as an error; everything after the
    /// response headers arrive is reported through the returned stream.
    pub async fn handle(&self, input: Value) -> Result<OutputStream, WorkerError> {
        let request = route_job(&*self.engine, input);
        info!(
            route = %request.decision,
            url = %request.url,
            stream = request.stream,
            "Dispatching job to engine"
        );

        let response = self.send(&request).await?;
        Ok(translate(&request, response))
    }

    async fn send(&self, request: &OutboundRequest) -> Result<reqwest::Response, WorkerError> {
        let result = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.body)
            .send()
            .await;

        match result {
            Ok(response) => {
                debug!(
                    url = %request.url,
                    status = %response.status(),
                    "Received response from engine"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Request to engine failed");
                Err(e.into())
            }
        }
    }
}
