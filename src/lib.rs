//! Bridge between a sensor-equipped chessboard and an online game.
//!
//! The board reports which squares are occupied, and by which colour, over a
//! serial link. eChess decodes those frames, works out which move the player
//! made by comparing the board with the game's position, waits for the move
//! to settle, submits it, and lights the board's LEDs to show pending moves.
//!
//! # Features
//!
//! - **Resynchronizing frame decoder**: tolerates partial and corrupted frames
//! - **Move inference**: diff-based, including promotion prompts
//! - **Debounced commits**: a move is only sent once the board is still
//! - **Self-healing game state**: replays the authoritative move list on gaps
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use echess::{Bridge, BridgeConfig, Credentials, LichessClient, UiChannels};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> echess::Result<()> {
//!     let config = BridgeConfig::load("echess.yaml")?;
//!     echess::logging::init(&config.log_filter)?;
//!
//!     let credentials = Credentials::load(&config.secret_path)?;
//!     let remote = Arc::new(LichessClient::new(&config.api_base, credentials.token())?);
//!     let (core, _ui) = UiChannels::new(config.ui_channel_capacity);
//!
//!     // Any AsyncRead/AsyncWrite pair opened on the board's serial port
//!     let (link, leds) = tokio::io::split(tokio::io::duplex(64).0);
//!     Bridge::over_serial(link, leds, remote, core, &config).run().await
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Board link
pub mod board;
pub mod decoder;
pub mod driver;
pub mod provider;
pub mod providers;

// Game logic
pub mod debounce;
pub mod game;
pub mod inference;
pub mod orchestrator;

// Collaborators and setup
pub mod config;
pub mod logging;
pub mod remote;
pub mod ui;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use board::Board;
pub use config::{BridgeConfig, Credentials};
pub use debounce::{CommitOutcome, Debouncer, MoveSubmitter};
pub use decoder::FrameDecoder;
pub use driver::{Driver, DriverChannels};
pub use game::GameSession;
pub use inference::Inference;
pub use orchestrator::Orchestrator;
pub use provider::BoardProvider;
pub use providers::{ReplayProvider, SerialProvider};
pub use remote::{LichessClient, RemoteGame};
pub use ui::{UiChannels, UiIntent, UiNotification};

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Entry point wiring a board link to a game service.
pub struct Bridge;

impl Bridge {
    /// Assemble the bridge over the two halves of a serial link.
    ///
    /// Spawns the board reader task and returns the orchestrator, ready to
    /// [`run`](Orchestrator::run). Cancelling the orchestrator also stops the
    /// reader.
    ///
    /// ```rust,no_run
    /// # use echess::{Bridge, BridgeConfig, LichessClient, UiChannels};
    /// # use std::sync::Arc;
    /// # async fn example(remote: Arc<LichessClient>) -> echess::Result<()> {
    /// let config = BridgeConfig::default();
    /// let (core, ui) = UiChannels::new(config.ui_channel_capacity);
    /// let (link, leds) = tokio::io::split(tokio::io::duplex(64).0);
    ///
    /// let orchestrator = Bridge::over_serial(link, leds, remote, core, &config);
    /// let cancel = orchestrator.cancel_token();
    /// tokio::spawn(orchestrator.run());
    /// # drop((ui, cancel));
    /// # Ok(())
    /// # }
    /// ```
    pub fn over_serial<R, L, W>(
        link: L,
        leds: W,
        remote: Arc<R>,
        ui: ui::CoreUi,
        config: &BridgeConfig,
    ) -> Orchestrator<R, W>
    where
        R: RemoteGame,
        L: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let driver = Driver::spawn(SerialProvider::new(link, config.max_frame_buffer));
        let board = Board::new(leds).with_sequence_periods(config.led_start_period(), config.led_end_period());
        let orchestrator = Orchestrator::new(remote, Arc::new(board), driver.occupancy, ui, config);

        let stop = orchestrator.cancel_token();
        let reader = driver.cancel;
        tokio::spawn(async move {
            stop.cancelled().await;
            reader.cancel();
        });

        orchestrator
    }
}
