//! Physical board occupancy as reported by the sensors

use shakmaty::{Chess, Color, Position, Square};
use std::fmt;

/// What the sensors see on a single square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SquareState {
    #[default]
    Empty,
    White,
    Black,
}

impl SquareState {
    /// Colour of the piece on the square, if any.
    pub fn color(self) -> Option<Color> {
        match self {
            SquareState::Empty => None,
            SquareState::White => Some(Color::White),
            SquareState::Black => Some(Color::Black),
        }
    }

    pub fn is_empty(self) -> bool {
        self == SquareState::Empty
    }

    fn symbol(self) -> char {
        match self {
            SquareState::Empty => '.',
            SquareState::White => 'W',
            SquareState::Black => 'B',
        }
    }
}

impl From<Option<Color>> for SquareState {
    fn from(color: Option<Color>) -> Self {
        match color {
            None => SquareState::Empty,
            Some(Color::White) => SquareState::White,
            Some(Color::Black) => SquareState::Black,
        }
    }
}

/// Full-board occupancy snapshot, one [`SquareState`] per square.
///
/// Indexed by [`Square`], so index `8 * rank + file` (a1 = 0, h8 = 63).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occupancy {
    squares: [SquareState; 64],
}

impl Occupancy {
    /// A board with nothing on it.
    pub fn empty() -> Self {
        Self { squares: [SquareState::Empty; 64] }
    }

    /// Occupancy a perfectly placed physical board would report for `pos`.
    pub fn from_position(pos: &Chess) -> Self {
        let board = pos.board();
        let mut occupancy = Self::empty();
        for sq in Square::ALL {
            occupancy.set(sq, board.color_at(sq).into());
        }
        occupancy
    }

    pub fn get(&self, sq: Square) -> SquareState {
        self.squares[usize::from(sq)]
    }

    pub fn set(&mut self, sq: Square, state: SquareState) {
        self.squares[usize::from(sq)] = state;
    }

    /// Number of squares the sensors report as occupied.
    pub fn occupied_count(&self) -> usize {
        self.squares.iter().filter(|s| !s.is_empty()).count()
    }
}

impl Default for Occupancy {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Occupancy {
    // Rank 8 on top, like a diagram.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for rank in (0..8u32).rev() {
            for file in 0..8u32 {
                let sq = Square::new(rank * 8 + file);
                write!(f, "{}", self.get(sq).symbol())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
