//! Message boundary with the user interface
//!
//! The UI is an external collaborator reached through two queues: the core
//! sends [`UiNotification`]s and receives [`UiIntent`]s. Nothing here knows
//! how the UI renders them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::Result;
use crate::remote::{RemoteGame, SeekHandle, SeekRequest};

/// Messages from the core to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiNotification {
    GameStarted,
    GameWon,
    GameLost,
    GameDrawn,
    GameAborted,
    NoCurrentGame,
    Seeking,
    StopSeeking,
    /// A pawn reached the last rank; answer with [`UiIntent::Promote`]
    PromotionRequested,
    MovesUpdated(Vec<String>),
}

/// Piece chosen for a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionChoice {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl PromotionChoice {
    /// UCI suffix appended to the move.
    pub fn suffix(self) -> char {
        match self {
            PromotionChoice::Queen => 'q',
            PromotionChoice::Rook => 'r',
            PromotionChoice::Bishop => 'b',
            PromotionChoice::Knight => 'n',
        }
    }
}

/// Messages from the UI to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiIntent {
    Seek { time: u32, increment: u32 },
    CancelSeek,
    Resign,
    Abort,
    OfferDraw,
    Promote(PromotionChoice),
}

/// Time controls offered by the UI, as (minutes, increment seconds).
pub const SEEK_PRESETS: [(u32, u32); 5] = [(10, 5), (15, 10), (15, 30), (30, 20), (30, 30)];

impl fmt::Display for UiIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiIntent::Seek { time, increment } => write!(f, "Seek{time}|{increment}"),
            UiIntent::CancelSeek => f.write_str("CancelSeek"),
            UiIntent::Resign => f.write_str("Resign"),
            UiIntent::Abort => f.write_str("Abort"),
            UiIntent::OfferDraw => f.write_str("Draw"),
            UiIntent::Promote(choice) => write!(f, "Promote({})", choice.suffix()),
        }
    }
}

/// Sending half of the notification queue. Sends never fail: a UI that went
/// away is logged and ignored.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<UiNotification>,
}

impl Notifier {
    pub fn new(tx: mpsc::Sender<UiNotification>) -> Self {
        Self { tx }
    }

    pub async fn notify(&self, notification: UiNotification) {
        debug!(?notification, "Notifying UI");
        if self.tx.send(notification).await.is_err() {
            debug!("UI notification receiver dropped");
        }
    }
}

/// The core's end of the UI queues.
#[derive(Debug)]
pub struct CoreUi {
    pub notifier: Notifier,
    pub intents: mpsc::Receiver<UiIntent>,
}

/// The UI's end of the queues.
#[derive(Debug)]
pub struct UiHandle {
    pub notifications: mpsc::Receiver<UiNotification>,
    pub intents: mpsc::Sender<UiIntent>,
}

/// Both ends of the UI boundary.
pub struct UiChannels;

impl UiChannels {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> (CoreUi, UiHandle) {
        let (notify_tx, notify_rx) = mpsc::channel(capacity);
        let (intent_tx, intent_rx) = mpsc::channel(capacity);
        (
            CoreUi { notifier: Notifier::new(notify_tx), intents: intent_rx },
            UiHandle { notifications: notify_rx, intents: intent_tx },
        )
    }
}

/// Owns the single outstanding seek.
pub struct SeekManager<R> {
    remote: Arc<R>,
    notifier: Notifier,
    outstanding: Mutex<Option<SeekHandle>>,
    cooldown: Duration,
}

impl<R: RemoteGame> SeekManager<R> {
    pub fn new(remote: Arc<R>, notifier: Notifier, cooldown: Duration) -> Self {
        Self { remote, notifier, outstanding: Mutex::new(None), cooldown }
    }

    /// Open a seek, replacing any outstanding one.
    ///
    /// The seek is rated unless the account's rating for its speed is still
    /// provisional, or the profile cannot be fetched.
    pub async fn create_seek(&self, time: u32, increment: u32) -> Result<()> {
        let mut outstanding = self.outstanding.lock().await;
        self.notifier.notify(UiNotification::Seeking).await;

        if let Some(previous) = outstanding.take() {
            info!("Cancelling previous seek");
            previous.cancel();
            tokio::time::sleep(self.cooldown).await;
        }

        let mut seek = SeekRequest { time, increment, rated: true };
        match self.remote.fetch_profile().await {
            Ok(profile) if profile.is_provisional(seek.speed()) => {
                info!(speed = ?seek.speed(), "Provisional rating, seeking an unrated game");
                seek.rated = false;
            }
            Ok(_) => {}
            Err(e) => warn!("Could not fetch profile, seeking a rated game: {}", e),
        }

        match self.remote.create_seek(seek).await {
            Ok(handle) => {
                *outstanding = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.notifier.notify(UiNotification::StopSeeking).await;
                Err(e)
            }
        }
    }

    /// Withdraw the outstanding seek, if any.
    pub async fn cancel_seek(&self) {
        match self.outstanding.lock().await.take() {
            Some(handle) => {
                handle.cancel();
                info!("Seek cancelled");
            }
            None => debug!("No seek to cancel"),
        }
        self.notifier.notify(UiNotification::StopSeeking).await;
    }

    /// Drop the outstanding seek once a game has started from it.
    pub async fn settle(&self) {
        if let Some(handle) = self.outstanding.lock().await.take() {
            debug!("Game started, releasing seek");
            handle.cancel();
        }
    }

    pub async fn is_seeking(&self) -> bool {
        self.outstanding.lock().await.as_ref().is_some_and(|h| !h.is_cancelled())
    }
}
