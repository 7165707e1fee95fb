//! Provider trait for board occupancy sources

use crate::Result;
use crate::types::Occupancy;

/// Trait for sources of board occupancy snapshots
///
/// Providers abstract over where sensor data comes from (a live serial link,
/// a recorded capture) and handle their own pacing internally.
#[async_trait::async_trait]
pub trait BoardProvider: Send + 'static {
    /// Get the next occupancy snapshot
    ///
    /// Returns:
    /// - `Ok(Some(occupancy))` - A complete frame was decoded
    /// - `Ok(None)` - Source ended normally (end of a recording)
    /// - `Err(e)` - The link failed; this is fatal for the source
    async fn next_occupancy(&mut self) -> Result<Option<Occupancy>>;
}
