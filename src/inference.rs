//! Occupancy diff and move inference
//!
//! The lit squares are recomputed wholesale from the sensed occupancy and the
//! logical position on every board or game update. A move is only inferred
//! from exactly two lit squares: one the sensors report empty (the source)
//! and one they report occupied (the destination). Castling and en passant
//! light more than two squares and are never inferred.

use shakmaty::{Chess, Position, Square};
use tracing::trace;

use crate::game::GameSession;
use crate::types::{LitSquares, Occupancy};

/// Result of trying to read a move off the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    /// Nothing to play: mid-gesture, ambiguous or illegal
    None,
    /// A legal move in UCI notation
    Move(String),
    /// A last-rank pawn move whose promotion piece must be chosen
    NeedsPromotion(String),
}

impl Inference {
    /// The move string handed to the debouncer. Empty when nothing was inferred.
    pub fn as_offer(&self) -> &str {
        match self {
            Inference::None => "",
            Inference::Move(mv) | Inference::NeedsPromotion(mv) => mv,
        }
    }
}

/// Squares whose sensed occupancy differs from the position's piece colors.
pub fn lit_squares(occupancy: &Occupancy, position: &Chess) -> LitSquares {
    let board = position.board();
    Square::ALL
        .into_iter()
        .filter(|&sq| occupancy.get(sq).color() != board.color_at(sq))
        .collect()
}

/// Infer the move being made on the board, if there is exactly one candidate.
pub fn infer_move(occupancy: &Occupancy, lit: &LitSquares, game: &GameSession) -> Inference {
    if lit.len() != 2 {
        return Inference::None;
    }

    let mut source = None;
    let mut dest = None;
    for sq in lit.iter() {
        if occupancy.get(sq).is_empty() {
            source = Some(sq);
        } else {
            dest = Some(sq);
        }
    }

    let (Some(source), Some(dest)) = (source, dest) else {
        return Inference::None;
    };

    let mv = format!("{source}{dest}");
    let check = game.validate_move(&mv);
    trace!(%mv, ?check, "Inferred move");

    match (check.valid, check.needs_promotion) {
        (false, _) => Inference::None,
        (true, false) => Inference::Move(mv),
        (true, true) => Inference::NeedsPromotion(mv),
    }
}
