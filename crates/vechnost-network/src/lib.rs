//! Vechnost Network Layer
//!
//! Fetch plumbing shared by the page and the service worker.
//!
//! Architecture:
//! 1. Caller builds a [`FetchRequest`] (URL, destination, CORS mode)
//! 2. A [`Fetcher`] resolves it: the real [`HttpClient`], or a worker in front of it
//! 3. The [`Response`] records whether the caller may read it (basic / cors / opaque)

mod client;
mod fetcher;
mod request;
mod response;

pub use client::{HttpClient, HttpClientConfig, HttpError};
pub use fetcher::Fetcher;
pub use request::{FetchRequest, RequestMode, ResourceType};
pub use response::{Response, ResponseType};

pub use hyper::body::Bytes;
pub use hyper::StatusCode;
