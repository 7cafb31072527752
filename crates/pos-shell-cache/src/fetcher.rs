// File: pos-shell-cache/src/fetcher.rs
// Purpose: Network access for cache misses and installs

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::response::{CachedResponse, FetchRequest};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid request method: {0}")]
    Method(String),

    /// For fetchers without a reqwest client underneath
    #[error("network unreachable: {0}")]
    Unreachable(String),
}

/// Performs a request against the network
///
/// Any HTTP reply, error statuses included, is `Ok`; only an unreachable
/// network is an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError>;
}

/// `Fetcher` backed by a reqwest client
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::Method(request.method.clone()))?;

        let res = self.http.request(method, &request.url).send().await?;

        let status = res.status();
        let headers: BTreeMap<String, String> = res
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let url = res.url().to_string();
        let body = res.bytes().await?.to_vec();

        Ok(CachedResponse {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            fetched_at: Utc::now(),
        })
    }
}
