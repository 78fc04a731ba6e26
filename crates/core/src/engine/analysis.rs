//! Types for representing engine evaluation results

use std::fmt;

/// Position evaluation, always from White's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawn score (positive = white advantage)
    Centipawns(i32),
    /// Forced mate as reported by the engine; only the distance is displayed
    Mate(i32),
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => {
                let score = f64::from(*cp) / 100.0;
                if *cp >= 0 {
                    write!(f, "+{:.2}", score)
                } else {
                    write!(f, "{:.2}", score)
                }
            }
            Score::Mate(moves) => write!(f, "Mate in {}", moves.unsigned_abs()),
        }
    }
}

/// What a single engine output line tells us. Both fields are usually empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationUpdate {
    /// Best move in UCI notation (e.g., "e7e5"), or the literal "(none)"
    pub best_move: Option<String>,
    pub score: Option<Score>,
}

impl EvaluationUpdate {
    pub fn is_empty(&self) -> bool {
        self.best_move.is_none() && self.score.is_none()
    }
}
