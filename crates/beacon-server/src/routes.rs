//! HTTP endpoints and wire types.
//!
//! Read endpoints serve straight from memory and require no auth; write
//! endpoints require a bearer token. Durability and fanout degradation are
//! invisible to callers by design — the only user-visible failures are
//! invalid requests (400) and auth failures (401).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use beacon_core::errors::SyncError;
use beacon_core::time;
use beacon_core::update::{StoredUpdate, UpdatePayload};
use beacon_store::SyncStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::sse::{SseRegistry, SubscriptionGuard};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// The sync store (journal + canonical state).
    pub store: Arc<SyncStore>,
    /// Live fanout registry.
    pub sse: Arc<SseRegistry>,
    /// Ephemeral agent status document.
    pub agent_status: Arc<RwLock<Value>>,
    /// Bearer token for write endpoints.
    pub api_key: Arc<str>,
    /// When the server started (for `/health` uptime).
    pub start_time: Instant,
    /// SSE keep-alive comment interval.
    pub keep_alive: Duration,
}

impl AppState {
    /// The initial agent status document.
    #[must_use]
    pub fn initial_agent_status() -> Value {
        json!({
            "status": "idle",
            "task": null,
            "subs": [],
            "updatedAt": time::now_iso(),
        })
    }
}

/// Wrapper turning [`SyncError`] into the wire error shape.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            SyncError::InvalidRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            SyncError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while serving.
    pub status: String,
    /// Seconds since start.
    pub uptime: u64,
    /// Journaled update count.
    pub updates: usize,
    /// Timestamp of the newest update.
    pub last_update: Option<String>,
}

/// `GET /api/poll` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    /// Updates newer than `since` (or the most recent window).
    pub updates: Vec<StoredUpdate>,
    /// Server wall clock at response time.
    pub server_time: String,
    /// `updates.len()`.
    pub count: usize,
}

/// `GET /api/state` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    /// The full journal.
    pub updates: Vec<StoredUpdate>,
    /// Server wall clock at response time.
    pub server_time: String,
    /// `updates.len()`.
    pub total: usize,
}

/// `GET /api/cc-state` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CcStateResponse {
    /// The canonical state document, `null` before the first upload.
    pub state: Option<Value>,
    /// Present only when a state exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<String>,
}

/// `POST /api/cc-state` response.
#[derive(Debug, Serialize)]
pub struct SaveStateResponse {
    /// Always `true` (failures are 4xx).
    pub success: bool,
    /// Server wall clock at acceptance.
    pub ts: String,
}

/// `POST /api/push` response.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    /// Always `true` (failures are 4xx).
    pub success: bool,
    /// The stored update's server timestamp.
    pub timestamp: String,
}

/// `POST /api/batch` response.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Always `true` (failures are 4xx).
    pub success: bool,
    /// Accepted update count.
    pub count: usize,
    /// Timestamp of the first accepted update.
    pub timestamp: String,
}

/// `POST /api/agent-status` response.
#[derive(Debug, Serialize)]
pub struct StatusSaveResponse {
    /// Always `true`.
    pub success: bool,
}

/// Query parameters for `GET /api/poll`.
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Return updates strictly newer than this timestamp.
    pub since: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(app): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        uptime: app.start_time.elapsed().as_secs(),
        updates: app.store.update_count(),
        last_update: app.store.last_update_ts(),
    })
}

/// `GET /api/poll?since=` — delta poll against the journal.
pub async fn poll(
    State(app): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Json<PollResponse> {
    // An empty `since=` means "no cursor", same as omitting it.
    let since = query.since.as_deref().filter(|s| !s.is_empty());
    let updates = app.store.poll(since);
    Json(PollResponse {
        count: updates.len(),
        updates,
        server_time: time::now_iso(),
    })
}

/// `GET /api/state` — full journal snapshot for cold-start reconciliation.
pub async fn state_snapshot(State(app): State<AppState>) -> Json<StateResponse> {
    let updates = app.store.all_updates();
    Json(StateResponse {
        total: updates.len(),
        updates,
        server_time: time::now_iso(),
    })
}

/// `GET /api/cc-state` — the canonical state document.
pub async fn cc_state(State(app): State<AppState>) -> Json<CcStateResponse> {
    let state = app.store.state();
    let server_time = state.is_some().then(time::now_iso);
    Json(CcStateResponse { state, server_time })
}

/// `POST /api/cc-state` — full resync with additive server-side merge.
///
/// Accepts `{state: {...}}` or the raw document as the body.
pub async fn cc_state_save(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<SaveStateResponse>, ApiError> {
    crate::auth::authorize(&headers, &app.api_key)?;
    let incoming = match body.get("state") {
        Some(state) if !state.is_null() => state.clone(),
        _ => body,
    };
    let _ = app.store.replace_state(incoming);
    Ok(Json(SaveStateResponse {
        success: true,
        ts: time::now_iso(),
    }))
}

/// `POST /api/push` — accept one update: journal, fold, fan out.
pub async fn push(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<PushResponse>, ApiError> {
    crate::auth::authorize(&headers, &app.api_key)?;
    let payload: UpdatePayload = serde_json::from_value(body).unwrap_or_default();
    let stored = app.store.push(payload)?;
    let _ = app.sse.broadcast(&stored);
    Ok(Json(PushResponse {
        success: true,
        timestamp: stored.ts,
    }))
}

/// `POST /api/batch` — bulk ingestion into the journal.
///
/// No auto-merge and no fanout: importers follow up with a full resync or
/// rely on pollers.
pub async fn batch(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<BatchResponse>, ApiError> {
    crate::auth::authorize(&headers, &app.api_key)?;
    let updates = body
        .get("updates")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::invalid("updates must be a non-empty array"))?;
    let payloads: Vec<UpdatePayload> = updates
        .iter()
        .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
        .collect();
    let stored = app.store.push_batch(payloads)?;
    Ok(Json(BatchResponse {
        success: true,
        count: stored.len(),
        timestamp: stored[0].ts.clone(),
    }))
}

/// `GET /api/events` — SSE stream of accepted updates.
///
/// The first frame is always the connected sentinel. Dropping the stream
/// (client close) unsubscribes via guard; keep-alive comments double as the
/// half-open connection detector.
pub async fn events(
    State(app): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let (subscriber, mut rx) = app.sse.subscribe();
    let guard = SubscriptionGuard::new(app.sse.clone(), subscriber.id.clone());

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok(Event::default().data(frame.as_str()));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(app.keep_alive))
}

/// `GET /api/agent-status` — the ephemeral agent status document.
pub async fn agent_status(State(app): State<AppState>) -> Json<Value> {
    Json(app.agent_status.read().clone())
}

/// `POST /api/agent-status` — shallow-merge status fields, stamping
/// `updatedAt` server-side.
pub async fn agent_status_save(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<StatusSaveResponse>, ApiError> {
    crate::auth::authorize(&headers, &app.api_key)?;
    {
        let mut status = app.agent_status.write();
        if let (Some(doc), Some(fields)) = (status.as_object_mut(), body.as_object()) {
            for (k, v) in fields {
                let _ = doc.insert(k.clone(), v.clone());
            }
            let _ = doc.insert("updatedAt".to_string(), json!(time::now_iso()));
        }
    }
    Ok(Json(StatusSaveResponse { success: true }))
}
