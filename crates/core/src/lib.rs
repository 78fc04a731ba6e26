//! Chess Companion Core Library
//!
//! Plays moves through the shakmaty rules engine and keeps a UCI engine's
//! best move and evaluation current after every move.

pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod rules;
pub mod sync;

pub use config::{AnalysisConfig, EngineConfig};
pub use error::{Error, Result};
pub use orchestrator::{
    AnalysisOrchestrator, AnalysisPhase, AnalysisStatus, PublishedState, RequestContext, RequestId,
};
pub use rules::{GamePosition, IllegalMove};
pub use sync::lock;
