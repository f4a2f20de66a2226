//! spinwatch: online outcome prediction and alerting
//!
//! Polls a game-outcome feed, keeps the deduplicated history, refits a
//! category classifier on a schedule, combines it with rule-based
//! heuristics through a weighted vote, scores every source against the next
//! real outcome and pushes predictions plus win/loss feedback to a chat sink.

pub mod alerts;
pub mod api;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod features;
pub mod feed;
pub mod heuristics;
pub mod ingest;
pub mod models;
pub mod store;
pub mod tracker;

pub use config::EngineConfig;
pub use engine::{CycleReport, EngineSnapshot, EngineState, Intake};
