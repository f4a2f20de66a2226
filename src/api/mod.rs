//! Status API
//!
//! Reads come from the published snapshot and never touch the engine lock.
//! Writes (manual outcomes, scoreboard reset) take the same lock the poll
//! loop holds for a cycle.

mod status;

pub use status::*;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::engine::{EngineSnapshot, EngineState};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<EngineState>>,
    pub snapshot: Arc<ArcSwap<EngineSnapshot>>,
}

impl AppState {
    pub fn new(engine: EngineState) -> Self {
        let snapshot = Arc::new(ArcSwap::from_pointee(engine.snapshot()));
        Self {
            engine: Arc::new(Mutex::new(engine)),
            snapshot,
        }
    }

    /// Replace the published snapshot. Call while holding the engine lock.
    pub fn publish(&self, engine: &EngineState) {
        self.snapshot.store(Arc::new(engine.snapshot()));
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/prediction", get(get_prediction))
        .route("/api/scoreboard", get(get_scoreboard))
        .route("/api/scoreboard/reset", post(post_scoreboard_reset))
        .route("/api/outcomes", post(post_outcomes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind status API on {}", bind))?;
    info!("🌐 Status API listening on http://{}", bind);
    axum::serve(listener, router(state))
        .await
        .context("Server error")?;
    Ok(())
}
