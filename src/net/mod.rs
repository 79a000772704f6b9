//! Network access for asset mirrors
//!
//! [`Fetcher`] walks an ordered mirror list with a per-URL retry budget on
//! top of an [`HttpTransport`]. The production transport is the pooled
//! `reqwest` client in [`client`].

pub mod client;
pub mod fetcher;

use async_trait::async_trait;
use bytes::Bytes;

pub use client::PooledClient;
pub use fetcher::{Fetcher, Payload, ResponseKind};

/// Failure of a single request attempt
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Minimal GET interface the fetcher needs
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url`, returning the body of a 2xx response
    async fn get(&self, url: &str) -> Result<Bytes, FetchError>;

    /// Release pooled connections; the transport must stay usable afterwards
    async fn close(&self) {}
}
