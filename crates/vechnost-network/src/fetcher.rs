//! Fetch abstraction
//!
//! Everything that issues requests (the page's image queue, the service
//! worker) goes through [`Fetcher`], so the network client, a worker-routed
//! page fetcher and test doubles are interchangeable.

use crate::client::HttpError;
use crate::request::FetchRequest;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;

/// Something that can turn a request into a response
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform a single fetch. Non-2xx statuses are responses, not errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, HttpError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, HttpError> {
        (**self).fetch(request).await
    }
}
