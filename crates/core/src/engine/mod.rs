//! Chess engine integration
//!
//! Provides the UCI command encoder, the output line parser and the engine
//! process session.

pub mod analysis;
pub mod encoder;
pub mod parser;
pub mod session;

// Re-export main types for convenience
pub use analysis::{EvaluationUpdate, Score};
pub use encoder::{encode_new_game, encode_position, encode_search};
pub use parser::{ends_search, parse_line};
pub use session::{
    EngineError, EngineLink, EngineOutput, EngineSession, OutputChannel, OutputHandler,
    Subscription,
};
