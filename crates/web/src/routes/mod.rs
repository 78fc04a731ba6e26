use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use shakmaty::Square;
use std::sync::Arc;

use chess_companion_core::engine::EngineLink;
use chess_companion_core::{lock, AnalysisOrchestrator, AnalysisStatus};

use crate::AppState;

/// Board and analysis as the UI renders them
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StateView {
    pub fen: String,
    pub side_to_move: String,
    pub best_move: String,
    pub evaluation: String,
    pub status: AnalysisStatus,
    /// Engine name from the UCI handshake, absent until the engine reports it
    pub engine: Option<String>,
}

impl StateView {
    fn from_orchestrator(orchestrator: &AnalysisOrchestrator) -> Self {
        let position = orchestrator.current_position();
        let published = orchestrator.latest_published_state();

        Self {
            fen: position.fen().to_string(),
            side_to_move: position.side_to_move_str().to_string(),
            best_move: published.best_move,
            evaluation: published.evaluation,
            status: published.status,
            engine: orchestrator.engine().engine_name(),
        }
    }
}

#[derive(Deserialize)]
pub struct MoveForm {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveResponse {
    pub accepted: bool,
    pub state: StateView,
}

pub async fn state(State(state): State<Arc<AppState>>) -> Json<StateView> {
    let orchestrator = lock(&state.orchestrator);
    Json(StateView::from_orchestrator(&orchestrator))
}

pub async fn make_move(
    State(state): State<Arc<AppState>>,
    Json(form): Json<MoveForm>,
) -> Result<Json<MoveResponse>, (StatusCode, String)> {
    let from: Square = form
        .from
        .trim()
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("Invalid square: {}", form.from)))?;
    let to: Square = form
        .to
        .trim()
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("Invalid square: {}", form.to)))?;

    let mut orchestrator = lock(&state.orchestrator);
    let accepted = orchestrator.try_move(from, to);

    Ok(Json(MoveResponse {
        accepted,
        state: StateView::from_orchestrator(&orchestrator),
    }))
}

pub async fn reset(State(state): State<Arc<AppState>>) -> Json<StateView> {
    let mut orchestrator = lock(&state.orchestrator);
    orchestrator.reset();
    Json(StateView::from_orchestrator(&orchestrator))
}

pub async fn health() -> &'static str {
    "OK"
}
