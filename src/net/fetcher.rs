//! Mirror fetcher with retry and fallback

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, StickerError};
use crate::net::{FetchError, HttpTransport};

/// How the response body should be returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Bytes,
    Text,
    Json,
}

/// Decoded response body
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Bytes),
    Text(String),
    Json(Value),
}

impl Payload {
    fn decode(body: Bytes, kind: ResponseKind) -> std::result::Result<Self, FetchError> {
        match kind {
            ResponseKind::Bytes => Ok(Self::Bytes(body)),
            ResponseKind::Text => String::from_utf8(body.to_vec())
                .map(Self::Text)
                .map_err(|e| FetchError::Decode(e.to_string())),
            ResponseKind::Json => serde_json::from_slice(&body)
                .map(Self::Json)
                .map_err(|e| FetchError::Decode(e.to_string())),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => Bytes::from(text),
            Self::Json(value) => Bytes::from(value.to_string()),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

/// Fetches a resource from the first mirror that answers.
///
/// Each URL is tried once plus `retries` more times before moving on to the
/// next one. When every URL is exhausted the error of the final attempt is
/// returned as [`StickerError::SourceUnavailable`].
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub async fn fetch(&self, urls: &[String], retries: u32, kind: ResponseKind) -> Result<Payload> {
        if urls.is_empty() {
            return Err(StickerError::NoSourceUrls);
        }

        let mut last_failure: Option<(&str, FetchError)> = None;

        for (index, url) in urls.iter().enumerate() {
            for attempt in 0..=retries {
                match self.attempt(url, kind).await {
                    Ok(payload) => {
                        debug!("Fetched {} on attempt {}", url, attempt + 1);
                        return Ok(payload);
                    }
                    Err(e) => {
                        warn!("Error occurred while requesting {} (attempt {}): {}", url, attempt + 1, e);
                        last_failure = Some((url.as_str(), e));
                    }
                }
            }

            if index + 1 < urls.len() {
                debug!("Falling back from {} to the next mirror", url);
            }
        }

        let (url, error) = last_failure.ok_or(StickerError::NoSourceUrls)?;
        Err(StickerError::SourceUnavailable {
            url: url.to_string(),
            message: error.to_string(),
        })
    }

    pub async fn fetch_bytes(&self, urls: &[String], retries: u32) -> Result<Bytes> {
        Ok(self.fetch(urls, retries, ResponseKind::Bytes).await?.into_bytes())
    }

    pub async fn fetch_text(&self, urls: &[String], retries: u32) -> Result<String> {
        Ok(self.fetch(urls, retries, ResponseKind::Text).await?.into_text())
    }

    async fn attempt(&self, url: &str, kind: ResponseKind) -> std::result::Result<Payload, FetchError> {
        let body = self.transport.get(url).await?;
        Payload::decode(body, kind)
    }

    /// Close pooled connections held by the transport
    pub async fn close(&self) {
        self.transport.close().await;
    }
}
