//! Move validation and position snapshots, delegated to shakmaty

use shakmaty::{fen::Fen, Chess, Color, EnPassantMode, File, Move, Position, Role, Square};
use thiserror::Error;

/// The move was rejected by the rules engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal move: {uci}")]
pub struct IllegalMove {
    pub uci: String,
}

/// Immutable serialized board state handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePosition {
    fen: String,
    side_to_move: Color,
}

impl GamePosition {
    pub fn from_board(board: &Chess) -> Self {
        Self {
            fen: Fen::from_position(board, EnPassantMode::Legal).to_string(),
            side_to_move: board.turn(),
        }
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// "w" or "b", as in the FEN
    pub fn side_to_move_str(&self) -> &'static str {
        match self.side_to_move {
            Color::White => "w",
            Color::Black => "b",
        }
    }
}

/// Plays `from`-`to` on `board` if it is legal.
///
/// `promotion` is only used when the move actually promotes; passing
/// `Some(Role::Queen)` for every move gives "always promote to queen".
pub fn apply_move(
    board: &Chess,
    from: Square,
    to: Square,
    promotion: Option<Role>,
) -> Result<Chess, IllegalMove> {
    let plain = format!("{}{}", from, to);
    let promoted = promotion.map(|role| format!("{}{}", plain, role_suffix(role)));

    let mv = board
        .legal_moves()
        .into_iter()
        .find(|mv| {
            let uci = move_to_uci(mv);
            uci == plain || promoted.as_deref() == Some(uci.as_str())
        })
        .ok_or_else(|| IllegalMove {
            uci: promoted.clone().unwrap_or_else(|| plain.clone()),
        })?;

    board
        .clone()
        .play(mv)
        .map_err(|_| IllegalMove { uci: plain })
}

/// Convert shakmaty Move to UCI string
pub fn move_to_uci(mv: &Move) -> String {
    match mv {
        Move::Normal { from, to, promotion, .. } => {
            let promo = promotion.map(role_suffix).unwrap_or("");
            format!("{}{}{}", from, to, promo)
        }
        Move::EnPassant { from, to, .. } => format!("{}{}", from, to),
        Move::Castle { king, rook } => {
            let king_to = if rook.file() > king.file() {
                Square::from_coords(File::G, king.rank())
            } else {
                Square::from_coords(File::C, king.rank())
            };
            format!("{}{}", king, king_to)
        }
        Move::Put { .. } => String::new(),
    }
}

fn role_suffix(role: Role) -> &'static str {
    match role {
        Role::Queen => "q",
        Role::Rook => "r",
        Role::Bishop => "b",
        Role::Knight => "n",
        _ => "",
    }
}
