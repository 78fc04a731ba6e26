//! UCI output line parsing
//!
//! Turns one raw line from the engine into an [`EvaluationUpdate`]. Most lines
//! the engine streams carry nothing we display, so an empty update is the
//! common result, never an error.

use shakmaty::Color;

use super::analysis::{EvaluationUpdate, Score};

/// Parses a single engine output line.
///
/// `side_to_move` is the side that was to move when the analysis request was
/// submitted. The engine reports scores from the perspective of the side it
/// searches for, so centipawn scores are negated unless `side_to_move` is
/// Black, which puts every published score in "positive favors White" terms.
///
/// # Example
/// ```
/// use chess_companion_core::engine::{parse_line, Score};
/// use shakmaty::Color;
///
/// let update = parse_line("info depth 15 score cp 30 pv e7e5", Color::White);
/// assert_eq!(update.score, Some(Score::Centipawns(-30)));
/// ```
pub fn parse_line(line: &str, side_to_move: Color) -> EvaluationUpdate {
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.first() == Some(&"bestmove") {
        // "bestmove e2e4 ponder e7e5"; a bare "bestmove" means no move yet
        return EvaluationUpdate {
            best_move: parts.get(1).map(|mv| mv.to_string()),
            score: None,
        };
    }

    if !parts.contains(&"info") {
        return EvaluationUpdate::default();
    }

    EvaluationUpdate {
        best_move: None,
        score: parse_score(&parts, side_to_move),
    }
}

/// Returns true if the line terminates a search, well-formed or not.
pub fn ends_search(line: &str) -> bool {
    line.split_whitespace().next() == Some("bestmove")
}

fn parse_score(parts: &[&str], side_to_move: Color) -> Option<Score> {
    let i = parts.iter().position(|part| *part == "score")?;
    let kind = parts.get(i + 1)?;
    let value = parts.get(i + 2)?.parse::<i32>().ok()?;

    match *kind {
        "cp" => {
            let cp = match side_to_move {
                Color::Black => value,
                Color::White => value.saturating_neg(),
            };
            Some(Score::Centipawns(cp))
        }
        "mate" => Some(Score::Mate(value)),
        _ => None,
    }
}
