//! HTTP Client
//!
//! Uses hyper with tokio for async HTTP/1.1.
//! Features:
//! - Automatic HTTPS with rustls (memory-safe TLS)
//! - Per-request timeout covering connect, headers and body
//! - Redirect following
//! - Fetch-style response typing (basic / cors / opaque) relative to the page origin

use crate::fetcher::Fetcher;
use crate::request::{FetchRequest, RequestMode};
use crate::response::{Response, ResponseType};
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HOST, LOCATION, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use rustls::ClientConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use url::Url;

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Body read error: {0}")]
    BodyError(String),

    #[error("Too many redirects ({0})")]
    TooManyRedirects(usize),
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
    /// Redirects followed before giving up
    pub max_redirects: usize,
    /// Origin of the page issuing requests; responses from other origins
    /// fetched in no-cors mode are opaque
    pub origin: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "Vechnost/0.1".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            max_redirects: 5,
            origin: None,
        }
    }
}

/// Client statistics
#[derive(Debug, Default)]
pub struct ClientStats {
    pub requests_made: AtomicU64,
    pub requests_failed: AtomicU64,
    pub bytes_downloaded: AtomicU64,
}

/// HTTP client
pub struct HttpClient {
    /// Configuration
    config: HttpClientConfig,
    /// Shared TLS connector
    tls: TlsConnector,
    /// Statistics
    stats: ClientStats,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        info!(
            "HTTP client initialized (timeout: {:?}, origin: {:?})",
            config.timeout,
            config.origin
        );

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
            stats: ClientStats::default(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Perform a GET request, following redirects
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.execute(&FetchRequest::new(url)).await
    }

    /// Execute a fetch request within the configured timeout
    pub async fn execute(&self, request: &FetchRequest) -> Result<Response, HttpError> {
        self.stats.requests_made.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(self.config.timeout, self.follow(request)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout),
        };

        if result.is_err() {
            self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Get client statistics (made, failed, bytes)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.requests_made.load(Ordering::Relaxed),
            self.stats.requests_failed.load(Ordering::Relaxed),
            self.stats.bytes_downloaded.load(Ordering::Relaxed),
        )
    }

    async fn follow(&self, request: &FetchRequest) -> Result<Response, HttpError> {
        let start = Instant::now();
        let mut current = Url::parse(&request.url)
            .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        for _ in 0..=self.config.max_redirects {
            let (status, headers, body, ttfb) = self.send_once(&current).await?;

            if status.is_redirection() {
                if let Some(next) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) {
                    current = current
                        .join(next)
                        .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
                    debug!("Redirected to {}", current);
                    continue;
                }
            }

            let response_type = self.classify(&current, request.mode);
            return Ok(Response {
                status,
                headers,
                body,
                response_type,
                ttfb,
                total_time: start.elapsed(),
                final_url: current.to_string(),
            });
        }

        Err(HttpError::TooManyRedirects(self.config.max_redirects))
    }

    /// Response type as seen by a page at `config.origin`
    fn classify(&self, url: &Url, mode: RequestMode) -> ResponseType {
        let Some(origin) = self.config.origin.as_deref().and_then(|o| Url::parse(o).ok()) else {
            return ResponseType::Basic;
        };

        if origin.origin() == url.origin() {
            ResponseType::Basic
        } else if mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }

    async fn send_once(
        &self,
        url: &Url,
    ) -> Result<(StatusCode, HeaderMap, Bytes, Duration), HttpError> {
        let uri: Uri = url.as_str().parse()
            .map_err(|e: hyper::http::uri::InvalidUri| HttpError::InvalidUrl(e.to_string()))?;

        let host = uri.host()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?
            .to_string();
        let is_https = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(USER_AGENT, &self.config.user_agent)
            .header(HOST, &host)
            .body(Empty::<Bytes>::new())
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        let addr = format!("{}:{}", host, port);
        let ttfb_start = Instant::now();

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            tokio::net::TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| HttpError::Timeout)?
        .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;

        let response = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| HttpError::TlsError("Invalid server name".to_string()))?;

            let tls_stream = self.tls.connect(server_name, stream).await
                .map_err(|e| HttpError::TlsError(e.to_string()))?;

            let io = hyper_util::rt::TokioIo::new(tls_stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await
                .map_err(|e| HttpError::HttpError(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender.send_request(request).await
        } else {
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await
                .map_err(|e| HttpError::HttpError(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender.send_request(request).await
        }
        .map_err(|e| HttpError::HttpError(e.to_string()))?;

        let ttfb = ttfb_start.elapsed();
        let status = response.status();
        let headers = response.headers().clone();

        // Collect body with size limit
        let limited = Limited::new(response.into_body(), self.config.max_body_size);
        let body = limited.collect().await
            .map_err(|e| HttpError::BodyError(e.to_string()))?
            .to_bytes();

        self.stats.bytes_downloaded.fetch_add(body.len() as u64, Ordering::Relaxed);

        debug!(
            "HTTP GET {} -> {} ({} bytes, {:?} TTFB)",
            url, status, body.len(), ttfb
        );

        Ok((status, headers, body, ttfb))
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, HttpError> {
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_at(origin: &str) -> HttpClient {
        HttpClient::new(HttpClientConfig {
            origin: Some(origin.to_string()),
            ..HttpClientConfig::default()
        })
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::with_defaults();
        assert_eq!(client.config().max_redirects, 5);
        assert_eq!(client.stats(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let client = HttpClient::with_defaults();

        let result = client.get("not a url").await;

        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));
        assert_eq!(client.stats().1, 1);
    }

    #[tokio::test]
    async fn test_response_classification() {
        let client = client_at("https://vechnost.store");
        let same = Url::parse("https://vechnost.store/assets/logo.gif").unwrap();
        let cross = Url::parse("https://i.imgur.com/0VaM2BR.png").unwrap();

        assert_eq!(client.classify(&same, RequestMode::NoCors), ResponseType::Basic);
        assert_eq!(client.classify(&cross, RequestMode::Cors), ResponseType::Cors);
        assert_eq!(client.classify(&cross, RequestMode::NoCors), ResponseType::Opaque);
    }

    #[tokio::test]
    async fn test_no_origin_is_basic() {
        let client = HttpClient::with_defaults();
        let cross = Url::parse("https://i.imgur.com/0VaM2BR.png").unwrap();

        assert_eq!(client.classify(&cross, RequestMode::NoCors), ResponseType::Basic);
    }

    /// Serve each canned response to one connection, in order
    async fn serve(responses: Vec<&'static str>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_simple_get() {
        let url = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        ])
        .await;
        let client = HttpClient::with_defaults();

        let response = client.get(&url).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.text().unwrap(), "hello");
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.response_type, ResponseType::Basic);
        assert_eq!(client.stats(), (1, 0, 5));
    }

    #[tokio::test]
    async fn test_follows_redirect() {
        let url = serve(vec![
            "HTTP/1.1 302 Found\r\nLocation: /moved.png\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 3\r\nConnection: close\r\n\r\npng",
        ])
        .await;
        let client = HttpClient::with_defaults();

        let response = client.get(&url).await.unwrap();

        assert_eq!(&response.body[..], b"png");
        assert_eq!(response.final_url, format!("{url}moved.png"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_counted() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::with_defaults();
        let result = client.get(&format!("http://{addr}/")).await;

        assert!(matches!(result, Err(HttpError::ConnectionFailed(_))));
        assert_eq!(client.stats(), (1, 1, 0));
    }
}
