//! Page-side fetcher whose requests go through the worker

use crate::worker::{FetchOutcome, ServiceWorker, WorkerError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use vechnost_network::{FetchRequest, Fetcher, HttpError, Response};

/// Routes each request through the active worker and falls back to the
/// plain network for requests the worker does not intercept
pub struct ControlledFetcher {
    worker: Arc<ServiceWorker>,
    network: Arc<dyn Fetcher>,
}

impl ControlledFetcher {
    pub fn new(worker: Arc<ServiceWorker>, network: Arc<dyn Fetcher>) -> Self {
        Self { worker, network }
    }
}

#[async_trait]
impl Fetcher for ControlledFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, HttpError> {
        match self.worker.handle_fetch(request).await {
            Ok(FetchOutcome::Respond(response)) => Ok(response),
            Ok(FetchOutcome::Passthrough) => {
                debug!("Not intercepted: {}", request.url);
                self.network.fetch(request).await
            }
            Err(WorkerError::Network(e)) => Err(e),
            Err(e) => Err(HttpError::ConnectionFailed(e.to_string())),
        }
    }
}
