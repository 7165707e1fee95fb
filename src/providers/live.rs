//! Serial link provider

use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, trace};

use crate::decoder::{DecoderStats, FrameDecoder};
use crate::provider::BoardProvider;
use crate::types::Occupancy;
use crate::{BridgeError, Result};

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 128;

/// Provider reading sensor frames from a byte transport such as a serial port.
///
/// Any tokio [`AsyncRead`] works; the caller opens and configures the port.
pub struct SerialProvider<R> {
    /// Read half of the serial transport
    reader: R,

    /// Frame decoder with its resync buffer
    decoder: FrameDecoder,

    /// Frames decoded but not yet handed out
    pending: VecDeque<Occupancy>,
}

impl<R> SerialProvider<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Create a new serial provider with the given frame buffer bound
    pub fn new(reader: R, max_buffer: usize) -> Self {
        info!(max_buffer, "Serial board provider created");
        Self { reader, decoder: FrameDecoder::new(max_buffer), pending: VecDeque::new() }
    }

    /// Decoder counters (frames, discarded messages, overflow trims)
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

#[async_trait::async_trait]
impl<R> BoardProvider for SerialProvider<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn next_occupancy(&mut self) -> Result<Option<Occupancy>> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(occupancy) = self.pending.pop_front() {
                return Ok(Some(occupancy));
            }

            let n = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(|e| BridgeError::link_failed_with_source("read from board failed", e))?;

            if n == 0 {
                debug!(stats = ?self.decoder.stats(), "Serial link reached end of stream");
                return Err(BridgeError::link_failed("board closed the serial link"));
            }

            trace!(bytes = n, "Read from serial link");
            self.pending.extend(self.decoder.feed(&chunk[..n]).iter().map(|f| f.decode()));
        }
    }
}
