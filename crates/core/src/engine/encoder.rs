//! UCI command encoding

use crate::rules::GamePosition;

/// Starts the UCI handshake.
pub const UCI: &str = "uci";
/// Asks the engine to report `readyok` once it has processed earlier commands.
pub const IS_READY: &str = "isready";

/// Builds the "set position" command.
///
/// The FEN passes through unchecked; the rules layer already validated it.
pub fn encode_position(position: &GamePosition) -> String {
    format!("position fen {}", position.fen())
}

/// Builds the "search to depth D" command.
pub fn encode_search(depth: u32) -> String {
    format!("go depth {}", depth)
}

/// Tells the engine the next position belongs to a new game.
pub fn encode_new_game() -> &'static str {
    "ucinewgame"
}
