use axum::{
    extract::{Json as AxumJson, State as AxumState},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::AppState;
use crate::engine::ScoreView;
use crate::ingest::IngestReport;
use crate::models::{CategoryScheme, Prediction, PredictionSource};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub history_len: usize,
    pub cycles: u64,
    pub model_fitted: bool,
    pub persistence_pending: bool,
}

#[derive(Debug, Serialize)]
pub struct PredictionView {
    pub label: u8,
    pub name: &'static str,
    pub confidence: f64,
}

impl PredictionView {
    fn new(p: &Prediction, scheme: CategoryScheme) -> Self {
        Self {
            label: p.label.0,
            name: scheme.name(p.label),
            confidence: p.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    /// Index of the outcome the predictions were made after
    pub made_at: Option<u64>,
    pub ensemble: Option<PredictionView>,
    pub by_source: BTreeMap<PredictionSource, PredictionView>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ScoreboardResponse {
    pub history_len: usize,
    pub scoreboard: BTreeMap<PredictionSource, ScoreView>,
}

#[derive(Debug, Deserialize)]
pub struct OutcomesRequest {
    pub values: Vec<i64>,
}

pub async fn health_check(AxumState(state): AxumState<AppState>) -> Json<HealthResponse> {
    let snap = state.snapshot.load();
    Json(HealthResponse {
        status: "ok",
        history_len: snap.history_len,
        cycles: snap.cycles,
        model_fitted: snap.model.fitted,
        persistence_pending: snap.persistence_pending,
    })
}

pub async fn get_prediction(AxumState(state): AxumState<AppState>) -> Json<PredictionResponse> {
    let snap = state.snapshot.load();
    let scheme = snap.scheme;
    let set = snap.predictions.as_ref();

    Json(PredictionResponse {
        made_at: set.map(|s| s.made_at),
        ensemble: set
            .and_then(|s| s.ensemble())
            .map(|p| PredictionView::new(p, scheme)),
        by_source: set
            .map(|s| {
                s.predictions
                    .iter()
                    .filter(|(source, _)| **source != PredictionSource::Ensemble)
                    .map(|(source, p)| (*source, PredictionView::new(p, scheme)))
                    .collect()
            })
            .unwrap_or_default(),
        updated_at: snap.updated_at,
    })
}

pub async fn get_scoreboard(AxumState(state): AxumState<AppState>) -> Json<ScoreboardResponse> {
    let snap = state.snapshot.load();
    Json(ScoreboardResponse {
        history_len: snap.history_len,
        scoreboard: snap.scoreboard.clone(),
    })
}

pub async fn post_scoreboard_reset(
    AxumState(state): AxumState<AppState>,
) -> Json<ScoreboardResponse> {
    let mut engine = state.engine.lock().await;
    engine.reset_scoreboard();
    state.publish(&engine);

    let snap = state.snapshot.load();
    Json(ScoreboardResponse {
        history_len: snap.history_len,
        scoreboard: snap.scoreboard.clone(),
    })
}

/// Manual ingestion of a batch of values.
pub async fn post_outcomes(
    AxumState(state): AxumState<AppState>,
    AxumJson(req): AxumJson<OutcomesRequest>,
) -> Result<Json<IngestReport>, (StatusCode, String)> {
    let mut engine = state.engine.lock().await;
    match engine.ingest_manual(&req.values) {
        Ok(report) => {
            state.publish(&engine);
            Ok(Json(report))
        }
        Err(e) => {
            warn!(error = %e, "manual batch rejected");
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}
