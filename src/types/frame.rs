//! Sensor frame wire format
//!
//! A frame is 16 payload bytes followed by the `FF FF FF` trailer. The payload
//! holds one `(white_mask, black_mask)` byte pair per rank, rank 1 first; bit
//! `n` of each mask is file `n` (bit 0 = file a).

use shakmaty::Square;

use super::{Occupancy, SquareState};

/// Payload length of one sensor frame.
pub const FRAME_PAYLOAD_LEN: usize = 16;

/// Frame delimiter that follows every payload.
pub const FRAME_TRAILER: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Payload plus trailer.
pub const FRAME_WIRE_LEN: usize = FRAME_PAYLOAD_LEN + FRAME_TRAILER.len();

/// One raw sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoardFrame(pub [u8; FRAME_PAYLOAD_LEN]);

impl BoardFrame {
    /// Decode the payload into an occupancy grid.
    ///
    /// A square with both colour bits set reads as white.
    pub fn decode(&self) -> Occupancy {
        let mut occupancy = Occupancy::empty();
        for (rank, pair) in self.0.chunks_exact(2).enumerate() {
            let (white, black) = (pair[0], pair[1]);
            for file in 0..8 {
                let state = if white & (1 << file) != 0 {
                    SquareState::White
                } else if black & (1 << file) != 0 {
                    SquareState::Black
                } else {
                    SquareState::Empty
                };
                occupancy.set(Square::new((rank * 8 + file) as u32), state);
            }
        }
        occupancy
    }

    /// Encode an occupancy grid the way the board firmware does.
    pub fn encode(occupancy: &Occupancy) -> Self {
        let mut payload = [0u8; FRAME_PAYLOAD_LEN];
        for sq in Square::ALL {
            let index = usize::from(sq);
            let (rank, file) = (index / 8, index % 8);
            match occupancy.get(sq) {
                SquareState::White => payload[rank * 2] |= 1 << file,
                SquareState::Black => payload[rank * 2 + 1] |= 1 << file,
                SquareState::Empty => {}
            }
        }
        Self(payload)
    }

    /// Payload followed by the trailer, as sent over the serial link.
    pub fn to_wire(&self) -> [u8; FRAME_WIRE_LEN] {
        let mut wire = [0u8; FRAME_WIRE_LEN];
        wire[..FRAME_PAYLOAD_LEN].copy_from_slice(&self.0);
        wire[FRAME_PAYLOAD_LEN..].copy_from_slice(&FRAME_TRAILER);
        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Chess;

    #[test]
    fn start_position_payload() {
        let frame = BoardFrame::encode(&Occupancy::from_position(&Chess::default()));
        assert_eq!(
            frame.0,
            [
                0xFF, 0x00, 0xFF, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0x00, 0xFF, 0x00, 0xFF
            ]
        );
    }

    #[test]
    fn bit_layout_maps_pairs_to_ranks_and_bits_to_files() {
        let mut payload = [0u8; FRAME_PAYLOAD_LEN];
        payload[3 * 2] = 1 << 4; // white on e4
        payload[6 * 2 + 1] = 1 << 2; // black on c7
        let occupancy = BoardFrame(payload).decode();

        assert_eq!(occupancy.get(Square::E4), SquareState::White);
        assert_eq!(occupancy.get(Square::C7), SquareState::Black);
        assert_eq!(occupancy.occupied_count(), 2);
    }

    #[test]
    fn white_wins_when_both_bits_are_set() {
        let mut payload = [0u8; FRAME_PAYLOAD_LEN];
        payload[0] = 0b0000_0001;
        payload[1] = 0b0000_0001;
        assert_eq!(BoardFrame(payload).decode().get(Square::A1), SquareState::White);
    }
}
