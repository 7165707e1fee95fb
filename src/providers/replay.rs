//! Replay provider for recorded serial captures

use std::collections::VecDeque;
use std::path::Path;
use tokio::time::{Duration, Interval, interval};
use tracing::{debug, info, trace};

use crate::decoder::{DEFAULT_MAX_BUFFER, FrameDecoder};
use crate::provider::BoardProvider;
use crate::types::Occupancy;
use crate::{BridgeError, Result};

/// Default pacing between replayed chunks, close to the board's sample rate
const DEFAULT_CHUNK_PERIOD: Duration = Duration::from_millis(50);

/// Replay provider feeding a raw byte capture through the frame decoder
///
/// The capture is whatever the board wrote to the serial link, noise and
/// partial frames included, so replays exercise the same resync path as a
/// live link.
pub struct ReplayProvider {
    /// Raw capture bytes
    capture: Vec<u8>,

    /// Read position in the capture
    position: usize,

    /// Bytes handed to the decoder per tick
    chunk_size: usize,

    /// Chunk pacing interval
    interval: Interval,

    decoder: FrameDecoder,
    pending: VecDeque<Occupancy>,
}

impl ReplayProvider {
    /// Create a replay provider from in-memory capture bytes
    pub fn from_bytes(capture: Vec<u8>) -> Self {
        info!("Replaying {} captured bytes", capture.len());
        Self {
            capture,
            position: 0,
            chunk_size: 128,
            interval: interval(DEFAULT_CHUNK_PERIOD),
            decoder: FrameDecoder::new(DEFAULT_MAX_BUFFER),
            pending: VecDeque::new(),
        }
    }

    /// Open a capture file written from a serial link
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let capture = std::fs::read(path).map_err(|e| {
            BridgeError::link_failed_with_source(format!("cannot read capture {}", path.display()), e)
        })?;
        Ok(Self::from_bytes(capture))
    }

    /// Set how many bytes are released per tick and how often
    pub fn with_pacing(mut self, chunk_size: usize, period: Duration) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.interval = interval(period);
        debug!(chunk_size = self.chunk_size, ?period, "Replay pacing set");
        self
    }

    /// Fraction of the capture consumed so far
    pub fn progress(&self) -> f64 {
        if self.capture.is_empty() {
            return 1.0;
        }
        self.position as f64 / self.capture.len() as f64
    }
}

#[async_trait::async_trait]
impl BoardProvider for ReplayProvider {
    async fn next_occupancy(&mut self) -> Result<Option<Occupancy>> {
        loop {
            if let Some(occupancy) = self.pending.pop_front() {
                return Ok(Some(occupancy));
            }

            if self.position >= self.capture.len() {
                debug!(stats = ?self.decoder.stats(), "Reached end of replay");
                return Ok(None);
            }

            self.interval.tick().await;

            let end = (self.position + self.chunk_size).min(self.capture.len());
            let frames = self.decoder.feed(&self.capture[self.position..end]);
            trace!(from = self.position, to = end, frames = frames.len(), "Replayed chunk");
            self.position = end;
            self.pending.extend(frames.iter().map(|f| f.decode()));
        }
    }
}
