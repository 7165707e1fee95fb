//! Squares where the physical board and the game disagree

use shakmaty::{Bitboard, Square};

/// First byte of an LED command.
pub const LED_COMMAND_START: u8 = 0xFE;

/// Last byte of an LED command.
pub const LED_COMMAND_END: u8 = 0xFF;

/// Set of lit squares. Drives both LED feedback and move inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LitSquares(Bitboard);

impl LitSquares {
    pub fn new() -> Self {
        Self(Bitboard::EMPTY)
    }

    pub fn insert(&mut self, sq: Square) {
        self.0 |= Bitboard::from(sq);
    }

    pub fn contains(&self, sq: Square) -> bool {
        self.0.contains(sq)
    }

    pub fn len(&self) -> usize {
        self.0.count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Squares in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = Square> + '_ {
        self.0.into_iter()
    }

    pub fn bitboard(&self) -> Bitboard {
        self.0
    }

    /// Serial command lighting exactly these squares.
    ///
    /// `FE, b1..bn, FF` with `b = (rank << 4) | file` per square.
    pub fn led_command(&self) -> Vec<u8> {
        let mut command = Vec::with_capacity(self.len() + 2);
        command.push(LED_COMMAND_START);
        command.extend(self.iter().map(led_byte));
        command.push(LED_COMMAND_END);
        command
    }
}

impl FromIterator<Square> for LitSquares {
    fn from_iter<I: IntoIterator<Item = Square>>(iter: I) -> Self {
        let mut lit = LitSquares::new();
        for sq in iter {
            lit.insert(sq);
        }
        lit
    }
}

fn led_byte(sq: Square) -> u8 {
    let index = usize::from(sq);
    (((index / 8) << 4) | (index % 8)) as u8
}
