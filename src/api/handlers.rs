use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{RepoError, StorageError};
use crate::models::*;
use crate::repository::{ChoreRepository, SnapshotEvent};
use crate::storage::ObjectStore;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn repo_error(e: RepoError) -> (StatusCode, String) {
    match e {
        RepoError::NotFound(id) => (StatusCode::NOT_FOUND, format!("Chore not found: {id}")),
        RepoError::Invalid(msg) => {
            tracing::warn!("Validation error: {}", msg);
            (StatusCode::BAD_REQUEST, msg)
        }
        other => internal_error(other),
    }
}

fn storage_error(e: StorageError) -> (StatusCode, String) {
    match e {
        StorageError::NotFound(path) => (StatusCode::NOT_FOUND, format!("Object not found: {path}")),
        StorageError::AlreadyExists(path) => {
            (StatusCode::CONFLICT, format!("Object already exists: {path}"))
        }
        StorageError::InvalidPath(path) => {
            tracing::warn!("Rejected object path: {}", path);
            (StatusCode::BAD_REQUEST, format!("Invalid object path: {path}"))
        }
        other => internal_error(other),
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Chores
// ============================================================

pub async fn list_family_chores(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<ChoreDocument>>, (StatusCode, String)> {
    state
        .repo
        .database()
        .get_family_chores(&normalize_family_code(&code))
        .map(Json)
        .map_err(internal_error)
}

/// Live snapshots for a family as Server-Sent Events. Each `snapshot` event
/// carries the full chore list; an `error` event ends the stream.
pub async fn stream_family_chores(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
    let subscription = state.repo.subscribe(&code).map_err(repo_error)?;
    tracing::debug!(family_code = %subscription.family_code(), "Streaming chores");

    let events = subscription.into_stream().map(|event| match event {
        SnapshotEvent::Snapshot(docs) => Event::default().event("snapshot").json_data(docs),
        SnapshotEvent::Error(message) => Ok(Event::default()
            .event("error")
            .data(message.replace('\r', " "))),
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn create_chore(
    State(state): State<AppState>,
    Json(input): Json<CreateChoreInput>,
) -> Result<(StatusCode, Json<Chore>), (StatusCode, String)> {
    state
        .repo
        .create(input)
        .await
        .map(|chore| (StatusCode::CREATED, Json(chore)))
        .map_err(repo_error)
}

pub async fn update_chore(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ChorePatch>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .repo
        .update(&id, patch)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(repo_error)
}

// ============================================================
// Proof objects
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlResponse {
    pub url: String,
}

pub async fn put_proof(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UrlResponse>), (StatusCode, String)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream");

    state
        .proofs
        .put(&path, body.to_vec(), content_type)
        .await
        .map_err(storage_error)?;
    let url = state.proofs.url(&path).await.map_err(storage_error)?;

    tracing::info!(path = %path, size = body.len(), "Stored proof object");
    Ok((StatusCode::CREATED, Json(UrlResponse { url })))
}

pub async fn get_proof(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let object = state.proofs.get(&path).await.map_err(storage_error)?;
    Ok(([(header::CONTENT_TYPE, object.content_type)], object.bytes))
}

pub async fn proof_url(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<UrlResponse>, (StatusCode, String)> {
    state
        .proofs
        .url(&path)
        .await
        .map(|url| Json(UrlResponse { url }))
        .map_err(storage_error)
}
