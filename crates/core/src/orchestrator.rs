//! Analysis orchestration
//!
//! Turns accepted moves into engine searches and publishes what the engine
//! reports. Each search is tagged with a request id and the side to move at
//! submission time; output is only published while it belongs to the newest
//! request.
//!
//! The engine answers every `go` with exactly one `bestmove`, in order, so
//! output lines are attributed to the oldest search that has not finished yet.
//! Lines from a superseded search are dropped even though they arrive through
//! the newest subscription.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color, Position, Role, Square};
use tracing::{debug, info, trace, warn};

use crate::config::AnalysisConfig;
use crate::engine::{
    encode_new_game, encode_position, encode_search, ends_search, parse_line, EngineError,
    EngineLink, EngineOutput, EngineSession, Subscription,
};
use crate::rules::{apply_move, GamePosition};
use crate::sync::lock;

pub type RequestId = u64;

/// Everything an output handler needs, fixed when the request is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub id: RequestId,
    /// The side that was to move before the move that triggered the request
    pub side_to_move: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Idle,
    Analyzing(RequestId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Idle,
    /// A search is running; it may never finish
    Calculating,
    /// The engine failed to start or went away
    Unavailable,
}

/// The only analysis state the UI sees
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishedState {
    pub best_move: String,
    pub evaluation: String,
    pub status: AnalysisStatus,
}

struct Shared {
    latest: RequestId,
    phase: AnalysisPhase,
    published: PublishedState,
    /// Requests whose `go` has been sent but whose `bestmove` has not arrived
    in_flight: VecDeque<RequestId>,
}

impl Shared {
    fn handle(&mut self, ctx: RequestContext, output: EngineOutput<'_>) {
        match output {
            EngineOutput::Line(line) => self.apply_line(ctx, line),
            EngineOutput::Terminated => self.engine_lost(),
        }
    }

    fn apply_line(&mut self, ctx: RequestContext, line: &str) {
        let owner = self.in_flight.front().copied();
        if ends_search(line) {
            self.in_flight.pop_front();
        }

        if owner != Some(ctx.id) || ctx.id != self.latest {
            if owner.is_some() {
                trace!(request = ?owner, latest = self.latest, line, "discarding stale output");
            }
            return;
        }

        let update = parse_line(line, ctx.side_to_move);
        if let Some(score) = update.score {
            self.published.evaluation = score.to_string();
        }
        if let Some(best_move) = update.best_move {
            debug!(request = ctx.id, %best_move, evaluation = %self.published.evaluation, "analysis finished");
            self.published.best_move = best_move;
            self.published.status = AnalysisStatus::Idle;
            self.phase = AnalysisPhase::Idle;
        }
    }

    fn engine_lost(&mut self) {
        warn!(phase = ?self.phase, "engine unavailable, dropping active request");
        self.in_flight.clear();
        self.phase = AnalysisPhase::Idle;
        self.published.status = AnalysisStatus::Unavailable;
    }
}

/// Owns the engine and the game, and keeps [`PublishedState`] current.
pub struct AnalysisOrchestrator<E: EngineLink = EngineSession> {
    engine: E,
    board: Chess,
    position: GamePosition,
    depth: u32,
    shared: Arc<Mutex<Shared>>,
    subscription: Option<Subscription>,
}

impl AnalysisOrchestrator<EngineSession> {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(EngineSession::new(config.engine.clone()), config.depth)
    }
}

impl<E: EngineLink> AnalysisOrchestrator<E> {
    /// Creates the orchestrator. The engine is not started until [`Self::start`].
    pub fn new(engine: E, depth: u32) -> Self {
        let board = Chess::default();
        let position = GamePosition::from_board(&board);

        Self {
            engine,
            board,
            position,
            depth,
            shared: Arc::new(Mutex::new(Shared {
                latest: 0,
                phase: AnalysisPhase::Idle,
                published: PublishedState::default(),
                in_flight: VecDeque::new(),
            })),
            subscription: None,
        }
    }

    /// Starts the engine. On failure the published status becomes
    /// `Unavailable`; moves are still accepted.
    pub fn start(&mut self) -> Result<(), EngineError> {
        // Until the first move, only engine loss matters; id 0 owns no search
        let watch = RequestContext {
            id: 0,
            side_to_move: self.board.turn(),
        };
        let shared = Arc::clone(&self.shared);
        self.subscription = Some(
            self.engine
                .subscribe(Box::new(move |output| lock(&shared).handle(watch, output))),
        );

        match self.engine.start() {
            Ok(()) => {
                info!(depth = self.depth, "analysis engine ready");
                Ok(())
            }
            Err(e) => {
                warn!("analysis unavailable: {}", e);
                lock(&self.shared).published.status = AnalysisStatus::Unavailable;
                Err(e)
            }
        }
    }

    /// Attempts a move on the current board. Pawns reaching the last rank
    /// always become queens.
    ///
    /// Returns false for an illegal move, in which case nothing is sent and
    /// no state changes.
    pub fn try_move(&mut self, from: Square, to: Square) -> bool {
        let board = match apply_move(&self.board, from, to, Some(Role::Queen)) {
            Ok(board) => board,
            Err(e) => {
                debug!("rejected: {}", e);
                return false;
            }
        };

        let mover = self.board.turn();
        self.board = board;
        self.position = GamePosition::from_board(&self.board);
        self.submit(mover);
        true
    }

    /// Starts a new game from the initial position. Output still pending from
    /// earlier searches is ignored.
    pub fn reset(&mut self) {
        self.board = Chess::default();
        self.position = GamePosition::from_board(&self.board);

        {
            let mut shared = lock(&self.shared);
            shared.latest += 1;
            shared.phase = AnalysisPhase::Idle;
            let status = match shared.published.status {
                AnalysisStatus::Unavailable => AnalysisStatus::Unavailable,
                _ => AnalysisStatus::Idle,
            };
            shared.published = PublishedState {
                status,
                ..PublishedState::default()
            };
        }

        if let Err(e) = self.engine.send(encode_new_game()) {
            debug!("new game not sent: {}", e);
        }
        info!("new game");
    }

    /// Drops the subscription and terminates the engine.
    pub fn shutdown(&mut self) {
        self.subscription = None;
        self.engine.stop();
        let mut shared = lock(&self.shared);
        shared.in_flight.clear();
        shared.phase = AnalysisPhase::Idle;
    }

    pub fn current_position(&self) -> &GamePosition {
        &self.position
    }

    pub fn latest_published_state(&self) -> PublishedState {
        lock(&self.shared).published.clone()
    }

    pub fn phase(&self) -> AnalysisPhase {
        lock(&self.shared).phase
    }

    pub fn latest_request(&self) -> RequestId {
        lock(&self.shared).latest
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn submit(&mut self, side_to_move: Color) -> RequestId {
        let ctx = {
            let mut shared = lock(&self.shared);
            shared.latest += 1;
            shared.phase = AnalysisPhase::Analyzing(shared.latest);
            if shared.published.status != AnalysisStatus::Unavailable {
                shared.published.status = AnalysisStatus::Calculating;
            }
            RequestContext {
                id: shared.latest,
                side_to_move,
            }
        };
        info!(request = ctx.id, fen = self.position.fen(), "requesting analysis");

        // Subscribe before sending so no line of this search can be missed
        let shared = Arc::clone(&self.shared);
        let subscription = self
            .engine
            .subscribe(Box::new(move |output| lock(&shared).handle(ctx, output)));
        self.subscription = Some(subscription);

        if let Err(e) = self.dispatch(ctx.id) {
            warn!(request = ctx.id, "could not send to engine: {}", e);
            lock(&self.shared).engine_lost();
        }
        ctx.id
    }

    fn dispatch(&self, id: RequestId) -> Result<(), EngineError> {
        self.engine.send(&encode_position(&self.position))?;
        lock(&self.shared).in_flight.push_back(id);
        self.engine.send(&encode_search(self.depth))
    }
}
