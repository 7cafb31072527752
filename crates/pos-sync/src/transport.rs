// File: pos-sync/src/transport.rs
// Purpose: Pluggable transport that ships change batches to the remote store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::compression::{Body, CompressionConfig};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::queue::ChangeRecord;

/// Body of a sync push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub changes: Vec<ChangeRecord>,
    pub user_id: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// Reply to a sync push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub is_mock: bool,
}

impl SyncResponse {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
            message: None,
            is_mock: false,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
            is_mock: false,
        }
    }
}

/// Positive acknowledgement of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncAck {
    /// The batch was not stored remotely; the acknowledgement is local only
    pub placeholder: bool,
}

/// Ships a batch of changes somewhere and reports whether it was accepted
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &SyncRequest) -> Result<SyncAck, TransportError>;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}

/// Transport used when no remote endpoint is configured
///
/// Accepts every batch after a fixed simulated delay and flags the
/// acknowledgement as a placeholder.
#[derive(Debug, Clone)]
pub struct NullTransport {
    delay: Duration,
}

impl NullTransport {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, request: &SyncRequest) -> Result<SyncAck, TransportError> {
        tokio::time::sleep(self.delay).await;
        tracing::info!(
            changes = request.changes.len(),
            "No remote endpoint configured, changes kept locally only"
        );
        Ok(SyncAck { placeholder: true })
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// HTTP transport posting JSON batches to the remote sync endpoint
#[derive(Clone)]
pub struct RemoteTransport {
    http: Client,
    endpoint: String,
    auth_token: Option<String>,
    compression: CompressionConfig,
}

impl RemoteTransport {
    pub fn new(
        endpoint: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
        compression: CompressionConfig,
    ) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            auth_token,
            compression,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn send(&self, request: &SyncRequest) -> Result<SyncAck, TransportError> {
        let json = serde_json::to_vec(request).map_err(|e| TransportError::Encode(e.to_string()))?;
        let body = Body::encode(json, &self.compression)
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        tracing::debug!(
            endpoint = %self.endpoint,
            changes = request.changes.len(),
            bytes = body.len(),
            gzip = body.is_compressed(),
            "Sending sync batch"
        );

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json");
        if body.is_compressed() {
            builder = builder.header(CONTENT_ENCODING, "gzip");
        }
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let res = builder.body(body.into_bytes()).send().await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let response = res.json::<SyncResponse>().await?;
        if !response.success {
            return Err(TransportError::Rejected {
                reason: response.error.unwrap_or_else(|| "Sync failed".to_string()),
            });
        }

        Ok(SyncAck {
            placeholder: response.is_mock,
        })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Pick the transport for a configuration: remote when an endpoint is set
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    match &config.endpoint {
        Some(endpoint) => {
            tracing::info!(%endpoint, "Using remote sync transport");
            Ok(Arc::new(RemoteTransport::new(
                endpoint.clone(),
                config.auth_token.clone(),
                config.timeout(),
                config.compression.clone(),
            )?))
        }
        None => {
            tracing::info!("No sync endpoint configured, using placeholder transport");
            Ok(Arc::new(NullTransport::new(config.mock_delay())))
        }
    }
}
