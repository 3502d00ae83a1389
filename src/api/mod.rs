mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::repository::SqliteChoreRepository;
use crate::storage::LocalObjectStore;

/// Largest proof photo the server accepts.
pub const MAX_PROOF_BYTES: usize = 20 * 1024 * 1024;

/// Shared state of the chore server.
#[derive(Clone)]
pub struct AppState {
    pub repo: SqliteChoreRepository,
    pub proofs: Arc<LocalObjectStore>,
}

impl AppState {
    pub fn new(repo: SqliteChoreRepository, proofs: LocalObjectStore) -> Self {
        Self {
            repo,
            proofs: Arc::new(proofs),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Chores
        .route("/families/{code}/chores", get(handlers::list_family_chores))
        .route(
            "/families/{code}/chores/stream",
            get(handlers::stream_family_chores),
        )
        .route("/chores", post(handlers::create_chore))
        .route("/chores/{id}", patch(handlers::update_chore))
        // Proof objects
        .route(
            "/proofs/{*path}",
            put(handlers::put_proof).get(handlers::get_proof),
        )
        .route("/proof-urls/{*path}", get(handlers::proof_url))
        // Health
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_PROOF_BYTES));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
