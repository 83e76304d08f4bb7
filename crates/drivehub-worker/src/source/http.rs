//! HTTP(S) remote source.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use drivehub_core::config::TransferConfig;
use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_core::traits::source::{RemoteContent, RemoteSource};

use super::naming::mime_from_content_type;

/// Streams remote files over HTTP(S), following redirects.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Build a client with the configured timeouts and user agent.
    pub fn new(config: &TransferConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .read_timeout(Duration::from_secs(config.read_timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn open(&self, url: &str) -> AppResult<RemoteContent> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest(url, e))?
            .error_for_status()
            .map_err(|e| map_reqwest(url, e))?;

        let total_bytes = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(mime_from_content_type);
        debug!(url, ?total_bytes, ?content_type, "Remote source opened");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(RemoteContent {
            total_bytes,
            content_type,
            stream: Box::pin(stream),
        })
    }
}

/// Map a client error onto the engine's error kinds.
pub fn map_reqwest(url: &str, err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if let Some(status) = err.status() {
        if status == reqwest::StatusCode::NOT_FOUND {
            ErrorKind::NotFound
        } else {
            ErrorKind::ExternalService
        }
    } else {
        ErrorKind::ExternalService
    };
    let message = match err.status() {
        Some(status) => format!("Source {url} answered {status}"),
        None => format!("Failed to fetch {url}: {err}"),
    };
    AppError::with_source(kind, message, err)
}
