//! Pooled HTTP client

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Proxy};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::proxy_from_env;
use crate::net::{FetchError, HttpTransport};

/// Idle connections kept per host
const POOL_MAX_IDLE_PER_HOST: usize = 20;

/// How long an idle pooled connection is kept around
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide `reqwest` client with connection pooling.
///
/// The client is built lazily and keyed by the proxy it was built with. The
/// proxy is re-read from the environment on every request and the client is
/// rebuilt when it changes. `close` drops the client; the next request
/// builds a fresh one.
#[derive(Debug)]
pub struct PooledClient {
    timeout: Duration,
    slot: Mutex<Option<(Option<String>, Client)>>,
}

impl PooledClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slot: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<Client, FetchError> {
        let proxy = proxy_from_env();
        let mut slot = self.slot.lock().await;

        if let Some((built_with, client)) = slot.as_ref() {
            if *built_with == proxy {
                return Ok(client.clone());
            }
            debug!("Proxy changed, rebuilding HTTP client");
        }

        let client = self.build(proxy.as_deref())?;
        *slot = Some((proxy, client.clone()));
        Ok(client)
    }

    fn build(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("sekai-stickers/", env!("CARGO_PKG_VERSION"))),
        );

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .default_headers(headers)
            .no_proxy();

        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| FetchError::Transport(format!("Invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {e}")))?;

        info!(
            "HTTP client initialized (timeout {:?}, proxy {})",
            self.timeout,
            proxy.unwrap_or("none")
        );
        Ok(client)
    }
}

#[async_trait]
impl HttpTransport for PooledClient {
    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let client = self.client().await?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(format!("Failed to read response: {e}")))
    }

    async fn close(&self) {
        if self.slot.lock().await.take().is_some() {
            debug!("HTTP client closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_is_reused() {
        let pooled = PooledClient::new(Duration::from_secs(5));
        pooled.client().await.unwrap();
        pooled.client().await.unwrap();
        assert!(pooled.slot.lock().await.is_some());
    }

    async fn built_with(pooled: &PooledClient) -> Option<String> {
        pooled.slot.lock().await.as_ref().and_then(|(proxy, _)| proxy.clone())
    }

    #[tokio::test]
    async fn test_proxy_change_rebuilds_client() {
        let pooled = PooledClient::new(Duration::from_secs(5));

        std::env::set_var("HTTPS_PROXY", "http://127.0.0.1:3128");
        pooled.client().await.unwrap();
        assert_eq!(built_with(&pooled).await.as_deref(), Some("http://127.0.0.1:3128"));

        std::env::set_var("HTTPS_PROXY", "http://127.0.0.1:8080");
        pooled.client().await.unwrap();
        assert_eq!(built_with(&pooled).await.as_deref(), Some("http://127.0.0.1:8080"));

        std::env::remove_var("HTTPS_PROXY");
        pooled.client().await.unwrap();
        assert_eq!(built_with(&pooled).await, proxy_from_env());
    }

    #[tokio::test]
    async fn test_close_then_rebuild() {
        let pooled = PooledClient::new(Duration::from_secs(5));
        pooled.client().await.unwrap();
        pooled.close().await;
        assert!(pooled.slot.lock().await.is_none());

        pooled.client().await.unwrap();
        assert!(pooled.slot.lock().await.is_some());
    }
}
