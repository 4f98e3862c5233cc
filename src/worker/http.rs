//! HTTP fetching for the worker pool

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, Proxy};
use thiserror::Error;
use tracing::debug;

use crate::config::HttpConfig;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout
        } else if e.is_redirect() {
            DownloadError::TooManyRedirects
        } else if e.is_builder() {
            DownloadError::InvalidUrl(e.to_string())
        } else {
            DownloadError::RequestFailed(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Status line and streaming body of a GET
pub struct FetchResponse {
    pub status: u16,
    pub body: BodyStream,
}

impl FetchResponse {
    pub fn new(status: u16, body: BodyStream) -> Self {
        Self { status, body }
    }

    /// Response whose body is a single in-memory chunk
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(status, futures::stream::once(async move { Ok(body) }).boxed())
    }
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Plain GET with no extra headers or auth
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse>;
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = config.proxy.as_deref() {
            let proxy = Proxy::all(url)
                .map_err(|e| DownloadError::InvalidUrl(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpClient {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        debug!(url, "Starting download");

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DownloadError::from))
            .boxed();

        Ok(FetchResponse::new(status, body))
    }
}
