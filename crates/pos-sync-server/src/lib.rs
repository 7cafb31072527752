// File: pos-sync-server/src/lib.rs
// Purpose: Reference remote endpoint for change batches pushed by POS clients

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_ENCODING, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use pos_sync::compression::decompress;
use pos_sync::{ChangeRecord, SyncRequest, SyncResponse};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Default listen address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8787";

/// Largest batch accepted after gzip decoding
pub const MAX_INFLATED_BODY: usize = 8 * 1024 * 1024;

/// A change as received, with who sent it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedChange {
    #[serde(flatten)]
    pub change: ChangeRecord,
    pub user_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Application state shared across handlers
#[derive(Clone, Default)]
pub struct AppState {
    changes: Arc<RwLock<Vec<ReceivedChange>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch; a change id seen before is overwritten in place
    pub async fn apply(&self, request: SyncRequest) -> usize {
        let mut changes = self.changes.write().await;
        let received_at = Utc::now();
        let count = request.changes.len();

        for change in request.changes {
            let received = ReceivedChange {
                change,
                user_id: request.user_id.clone(),
                received_at,
            };
            match changes.iter_mut().find(|c| c.change.id == received.change.id) {
                Some(existing) => *existing = received,
                None => changes.push(received),
            }
        }

        count
    }

    pub async fn changes(&self) -> Vec<ReceivedChange> {
        self.changes.read().await.clone()
    }
}

/// Build the router with all endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", post(post_sync_handler))
        .route("/api/sync/changes", get(list_changes_handler))
        .route("/api/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

type Rejection = (StatusCode, Json<SyncResponse>);

fn bad_request(error: impl Into<String>) -> Rejection {
    let error = error.into();
    tracing::warn!(%error, "Rejected sync batch");
    (StatusCode::BAD_REQUEST, Json(SyncResponse::rejected(error)))
}

/// Handler for POST /api/sync
///
/// Accepts plain or gzip-encoded JSON batches.
pub async fn post_sync_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncResponse>, Rejection> {
    if body.is_empty() {
        return Err(bad_request("Empty request body"));
    }

    let gzip = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    let json = if gzip {
        decompress(&body, MAX_INFLATED_BODY)
            .map_err(|e| bad_request(format!("Invalid gzip body: {}", e)))?
    } else {
        body.to_vec()
    };

    let request: SyncRequest = serde_json::from_slice(&json)
        .map_err(|e| bad_request(format!("Malformed sync request: {}", e)))?;

    let user = request.user_id.clone();
    let count = state.apply(request).await;
    tracing::info!(count, user = ?user, "Sync batch received");

    Ok(Json(SyncResponse::accepted()))
}

/// Handler for GET /api/sync/changes
pub async fn list_changes_handler(State(state): State<AppState>) -> Json<Vec<ReceivedChange>> {
    Json(state.changes().await)
}

/// Handler for GET /api/health
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
