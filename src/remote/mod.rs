//! Remote game service boundary
//!
//! The bridge only needs a handful of verbs from the game service. They are
//! collected in [`RemoteGame`] so the orchestrator can run against the HTTP
//! client in production and against an in-memory double in tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;
use crate::debounce::MoveSubmitter;

pub mod lichess;
pub mod types;

pub use lichess::LichessClient;
pub use types::{
    ChatLineEvent, GameEvent, GameFullEvent, GameStateEvent, NowPlaying, Opponent,
    OpponentGoneEvent, Perf, PlayerProfile, PlayingGame, Speed, parse_event_line,
};

/// Open seek parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    /// Initial clock in minutes
    pub time: u32,
    /// Increment in seconds
    pub increment: u32,
    pub rated: bool,
}

impl SeekRequest {
    pub fn speed(&self) -> Speed {
        Speed::from_clock(self.time, self.increment)
    }
}

/// Handle on an outstanding seek. The seek stays open until cancelled.
#[derive(Debug)]
pub struct SeekHandle {
    cancel: CancellationToken,
}

impl SeekHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Withdraw the seek. Consumes the handle, so it happens at most once.
    pub fn cancel(self) {
        debug!("Cancelling seek");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Verbs of the remote game service used by the bridge.
#[async_trait]
pub trait RemoteGame: Send + Sync + 'static {
    /// The game currently in progress for the account, if any.
    async fn find_current_game(&self) -> Result<Option<PlayingGame>>;

    /// Open the event stream of a game.
    ///
    /// Events are delivered by a background reader. The channel yields
    /// [`GameEvent::GameEnded`] when the stream ends normally and simply
    /// closes when the stream fails.
    async fn stream_game(&self, game_id: &str) -> Result<mpsc::Receiver<GameEvent>>;

    async fn submit_move(&self, game_id: &str, mv: &str) -> Result<()>;

    async fn resign(&self, game_id: &str) -> Result<()>;

    async fn abort(&self, game_id: &str) -> Result<()>;

    /// Offer a draw, or accept the opponent's offer.
    async fn offer_draw(&self, game_id: &str) -> Result<()>;

    async fn claim_victory(&self, game_id: &str) -> Result<()>;

    async fn create_seek(&self, seek: SeekRequest) -> Result<SeekHandle>;

    /// Profile of the authenticated account.
    async fn fetch_profile(&self) -> Result<PlayerProfile>;
}

#[async_trait]
impl<T: RemoteGame> MoveSubmitter for T {
    async fn submit(&self, game_id: &str, mv: &str) -> Result<()> {
        self.submit_move(game_id, mv).await
    }
}
