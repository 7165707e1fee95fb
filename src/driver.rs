//! Driver spawns and manages the board reader task

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::provider::BoardProvider;
use crate::types::Occupancy;

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Latest occupancy snapshot; `None` before the first frame and after the link ends
    pub occupancy: watch::Receiver<Option<Arc<Occupancy>>>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

impl DriverChannels {
    /// Stream of snapshots for observers other than the orchestrator.
    ///
    /// Yields the current snapshot first if there is one, then the latest
    /// snapshot after each change (intermediate ones may be skipped). Ends
    /// when the reader task does.
    pub fn snapshots(&self) -> impl Stream<Item = Arc<Occupancy>> + Send + 'static {
        WatchStream::new(self.occupancy.clone()).filter_map(|snapshot| async move { snapshot })
    }
}

/// Driver spawns and manages the board reader task
///
/// The reader task owns the provider and publishes every decoded snapshot to
/// a watch channel, so a slow consumer only ever sees the newest board.
/// Link failures are not retried: the task publishes `None` and ends.
pub struct Driver;

impl Driver {
    /// Spawn the reader task for the given provider
    pub fn spawn<P>(provider: P) -> DriverChannels
    where
        P: BoardProvider,
    {
        let (occupancy_tx, occupancy_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let cancel_reader = cancel.clone();

        tokio::spawn(async move {
            Self::reader_task(provider, occupancy_tx, cancel_reader).await;
        });

        DriverChannels { occupancy: occupancy_rx, cancel }
    }

    async fn reader_task<P>(
        mut provider: P,
        occupancy_tx: watch::Sender<Option<Arc<Occupancy>>>,
        cancel: CancellationToken,
    ) where
        P: BoardProvider,
    {
        info!("Board reader task started");
        let mut frame_count = 0u64;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Board reader cancelled");
                    break;
                }
                result = provider.next_occupancy() => result,
            };

            match result {
                Ok(Some(occupancy)) => {
                    frame_count += 1;
                    trace!(frame_count, occupied = occupancy.occupied_count(), "Board frame");

                    if occupancy_tx.send(Some(Arc::new(occupancy))).is_err() {
                        debug!("Occupancy receiver dropped, shutting down");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Board provider ended after {} frames", frame_count);
                    let _ = occupancy_tx.send(None);
                    break;
                }
                Err(e) => {
                    error!("Board link failed after {} frames: {}", frame_count, e);
                    let _ = occupancy_tx.send(None);
                    break;
                }
            }
        }

        info!("Board reader task ended (processed {} frames)", frame_count);
    }
}
