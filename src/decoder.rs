//! Trailer-delimited frame decoder for the serial byte stream
//!
//! The board sends `payload(16) FF FF FF` frames with no header or length
//! field. Bytes arrive in arbitrary chunks and the link may start mid-frame,
//! so the decoder keeps a bounded buffer and resynchronizes on the trailer.
//!
//! Once a frame boundary is known, frames are taken in order from the front.
//! Otherwise the buffer is scanned backward for the last run of `FF` bytes
//! long enough to hold a trailer, and the 16 bytes before the trailer become
//! the next frame. A payload may start with `FF` (a full white rank 1) or end
//! with it (a full black rank 8), so that run can be longer than three bytes.
//! Each trailer position inside it is then scored by how many squares its
//! neighbouring payloads would claim for both colours, and the position with
//! no such squares wins. The last consumed frame stays buffered as context,
//! which lets a stream opened mid-frame find its real boundary on the next
//! read.

use std::cmp::Reverse;

use tracing::{debug, trace, warn};

use crate::types::{BoardFrame, FRAME_PAYLOAD_LEN, FRAME_TRAILER, FRAME_WIRE_LEN};

/// Default upper bound on buffered bytes.
pub const DEFAULT_MAX_BUFFER: usize = 4096;

const TRAILER_BYTE: u8 = FRAME_TRAILER[0];

/// Counters describing what the decoder has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames decoded
    pub frames: u64,
    /// Incomplete messages dropped while resynchronizing
    pub discarded: u64,
    /// Times the buffer was halved because it hit its bound
    pub overflow_trims: u64,
}

/// Stateful decoder turning raw serial bytes into [`BoardFrame`]s.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Bytes at the front of `buffer` already decoded or dropped
    consumed: usize,
    /// The unconsumed bytes start on a frame boundary
    aligned: bool,
    max_buffer: usize,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

impl FrameDecoder {
    /// Create a decoder whose buffer never grows past `max_buffer` bytes.
    pub fn new(max_buffer: usize) -> Self {
        let max_buffer = max_buffer.max(FRAME_WIRE_LEN * 2);
        Self {
            buffer: Vec::with_capacity(max_buffer),
            consumed: 0,
            aligned: false,
            max_buffer,
            stats: DecoderStats::default(),
        }
    }

    /// Append newly read bytes and decode every complete frame now available.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<BoardFrame> {
        self.append(bytes);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }

        // Keep one frame's worth of consumed bytes as context
        let excess = self.consumed.saturating_sub(FRAME_WIRE_LEN);
        if excess > 0 {
            self.buffer.drain(..excess);
            self.consumed -= excess;
        }
        frames
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.consumed..]
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.buffer.len() + bytes.len() > self.max_buffer {
            self.buffer.drain(..self.consumed);
            self.consumed = 0;
        }

        // A single chunk larger than the bound only keeps its tail
        let bytes = if bytes.len() > self.max_buffer {
            self.trim(self.buffer.len());
            &bytes[bytes.len() - self.max_buffer..]
        } else {
            bytes
        };

        while !self.buffer.is_empty() && self.buffer.len() + bytes.len() > self.max_buffer {
            let half = self.buffer.len().div_ceil(2);
            self.trim(half);
        }

        self.buffer.extend_from_slice(bytes);
    }

    fn trim(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.stats.overflow_trims += 1;
        self.aligned = false;
        warn!(dropped = count, max_buffer = self.max_buffer, "Frame buffer overflow, trimming oldest bytes");
        self.buffer.drain(..count);
    }

    fn next_frame(&mut self) -> Option<BoardFrame> {
        loop {
            if self.buffer.len() - self.consumed < FRAME_WIRE_LEN {
                return None;
            }

            if self.aligned {
                let trailer_start = self.consumed + FRAME_PAYLOAD_LEN;
                let trailer = &self.buffer[trailer_start..trailer_start + FRAME_TRAILER.len()];
                if trailer == FRAME_TRAILER && self.contradictions_around(trailer_start) == 0 {
                    return Some(self.take(trailer_start));
                }
                debug!("Lost frame alignment");
                self.aligned = false;
            }

            let trailer_start = self.best_trailer()?;
            let trailer_end = trailer_start + FRAME_TRAILER.len();

            if trailer_start < FRAME_PAYLOAD_LEN {
                self.stats.discarded += 1;
                debug!(dropped = trailer_end - self.consumed, "Discarding incomplete message");
                self.consumed = trailer_end;
                continue;
            }

            let skipped = (trailer_start - FRAME_PAYLOAD_LEN).saturating_sub(self.consumed);
            if skipped > 0 {
                trace!(skipped, "Resynchronized on trailer");
            }
            self.aligned = true;
            return Some(self.take(trailer_start));
        }
    }

    /// Trailer position to resynchronize on, taken from the last `FF` run.
    ///
    /// Positions with a full payload before them come first, then the fewest
    /// contradictions, then the latest position.
    fn best_trailer(&self) -> Option<usize> {
        let (run_start, run_end) = self.last_trailer_run()?;
        let first = run_start.max(self.consumed);
        let last = run_end - FRAME_TRAILER.len();
        (first..=last).min_by_key(|&start| {
            (start < FRAME_PAYLOAD_LEN, self.contradictions_around(start), Reverse(start))
        })
    }

    /// Bounds of the last run of at least three `FF` bytes.
    fn last_trailer_run(&self) -> Option<(usize, usize)> {
        let mut end = self.buffer.len();
        while let Some(last) = self.buffer[..end].iter().rposition(|&b| b == TRAILER_BYTE) {
            let run_end = last + 1;
            let run_start = self.buffer[..run_end].iter().rposition(|&b| b != TRAILER_BYTE).map_or(0, |i| i + 1);
            if run_end - run_start >= FRAME_TRAILER.len() {
                return Some((run_start, run_end));
            }
            end = run_start;
        }
        None
    }

    /// Squares claimed by both colours in the payloads on either side of a
    /// trailer starting at `trailer_start`, as far as they are buffered.
    fn contradictions_around(&self, trailer_start: usize) -> u32 {
        // Payload pairs share the parity of the trailer position
        let before_start = trailer_start.checked_sub(FRAME_PAYLOAD_LEN).unwrap_or(trailer_start % 2);
        let after_start = (trailer_start + FRAME_TRAILER.len()).min(self.buffer.len());
        let after_end = (after_start + FRAME_PAYLOAD_LEN).min(self.buffer.len());

        contradictions(&self.buffer[before_start..trailer_start]) + contradictions(&self.buffer[after_start..after_end])
    }

    fn take(&mut self, trailer_start: usize) -> BoardFrame {
        let mut payload = [0u8; FRAME_PAYLOAD_LEN];
        payload.copy_from_slice(&self.buffer[trailer_start - FRAME_PAYLOAD_LEN..trailer_start]);
        self.consumed = trailer_start + FRAME_TRAILER.len();
        self.stats.frames += 1;
        trace!(frames = self.stats.frames, "Decoded board frame");
        BoardFrame(payload)
    }
}

/// Set bits shared by the white and black byte of each pair.
fn contradictions(bytes: &[u8]) -> u32 {
    bytes.chunks_exact(2).map(|pair| (pair[0] & pair[1]).count_ones()).sum()
}
