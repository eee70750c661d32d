//! HTTP collaborator interface for the remote metadata services.
//!
//! The engine only needs one primitive from the network: a GET with a
//! timeout, returning status and body. The trait keeps providers testable
//! with scripted responses; [`HttpRemote`] is the reqwest-backed production
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

const USER_AGENT: &str = concat!("asset-engine/", env!("CARGO_PKG_VERSION"));

/// Errors surfaced by a remote transport.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Status and body of a completed request. Non-2xx statuses are returned
/// here, not as errors; providers interpret them.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait RemoteFetch: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<RemoteResponse, RemoteError>;
}

/// Reqwest-backed transport with a pooled client.
pub struct HttpRemote {
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new() -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetch for HttpRemote {
    async fn get(&self, url: &str, timeout: Duration) -> Result<RemoteResponse, RemoteError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_err)?;

        Ok(RemoteResponse { status, body })
    }
}
