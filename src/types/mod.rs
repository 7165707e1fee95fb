//! Core types shared by the board link, the inference engine and the game session.
//!
//! ## Board geometry
//!
//! Every square is identified by a [`shakmaty::Square`], whose index is
//! `8 * rank + file` (a1 = 0, h1 = 7, h8 = 63). The serial protocol uses the
//! same index: frame byte pairs are ranks and mask bits are files, and an LED
//! byte is `(rank << 4) | file`.
//!
//! ## Usage Example
//!
//! ```rust
//! use echess::types::{BoardFrame, Occupancy, SquareState};
//! use shakmaty::{Chess, Square};
//!
//! let occupancy = Occupancy::from_position(&Chess::default());
//! let frame = BoardFrame::encode(&occupancy);
//!
//! assert_eq!(frame.decode(), occupancy);
//! assert_eq!(frame.decode().get(Square::E2), SquareState::White);
//! ```

mod frame;
mod lit_squares;
mod occupancy;

pub use frame::{BoardFrame, FRAME_PAYLOAD_LEN, FRAME_TRAILER, FRAME_WIRE_LEN};
pub use lit_squares::{LED_COMMAND_END, LED_COMMAND_START, LitSquares};
pub use occupancy::{Occupancy, SquareState};

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_frame_decode_encode_is_stable(payload in any::<[u8; 16]>()) {
            // Decoding normalizes both-bits-set squares to white, after which
            // encode and decode agree exactly
            let occupancy = BoardFrame(payload).decode();
            let normalized = BoardFrame::encode(&occupancy);
            prop_assert_eq!(normalized.decode(), occupancy);
            prop_assert_eq!(BoardFrame::encode(&normalized.decode()), normalized);
        }

        #[test]
        fn prop_wire_form_ends_with_trailer(payload in any::<[u8; 16]>()) {
            let wire = BoardFrame(payload).to_wire();
            prop_assert_eq!(&wire[..FRAME_PAYLOAD_LEN], &payload[..]);
            prop_assert_eq!(&wire[FRAME_PAYLOAD_LEN..], &FRAME_TRAILER[..]);
        }

        #[test]
        fn prop_led_command_length_matches_lit_count(indices in prop::collection::vec(0u32..64, 0..64)) {
            let lit: LitSquares = indices.iter().map(|&i| shakmaty::Square::new(i)).collect();
            let command = lit.led_command();
            prop_assert_eq!(command.len(), lit.len() + 2);
            prop_assert!(command[1..command.len() - 1].iter().all(|b| b & 0x88 == 0));
        }
    }
}
