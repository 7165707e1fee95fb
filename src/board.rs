//! Physical board state and LED output

use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use shakmaty::Square;

use crate::types::{LitSquares, Occupancy};
use crate::{BridgeError, Result};

/// Path walked by the start-of-game animation, spiralling out from the centre.
const START_SEQUENCE: [Square; 16] = [
    Square::E4,
    Square::E5,
    Square::D5,
    Square::D4,
    Square::D3,
    Square::E3,
    Square::F3,
    Square::F4,
    Square::F5,
    Square::F6,
    Square::E6,
    Square::D6,
    Square::C6,
    Square::C5,
    Square::C4,
    Square::C3,
];

/// Centre squares blinked at the end of a game.
const END_SEQUENCE: [Square; 4] = [Square::D4, Square::D5, Square::E4, Square::E5];

const END_SEQUENCE_BLINKS: usize = 3;

/// The physical board: last sensed occupancy plus the LED command sink.
///
/// Occupancy has one writer (the consumer of the frame decoder) and many
/// readers. The LED sink is the write half of the serial link and is only
/// ever written by one task at a time.
pub struct Board<W> {
    occupancy: RwLock<Occupancy>,
    leds: Mutex<W>,
    start_period: Duration,
    end_period: Duration,
}

impl<W> Board<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(leds: W) -> Self {
        Self {
            occupancy: RwLock::new(Occupancy::empty()),
            leds: Mutex::new(leds),
            start_period: Duration::from_millis(20),
            end_period: Duration::from_millis(300),
        }
    }

    /// Override the animation step periods.
    pub fn with_sequence_periods(mut self, start_period: Duration, end_period: Duration) -> Self {
        self.start_period = start_period;
        self.end_period = end_period;
        self
    }

    /// Replace the sensed occupancy with a fresh snapshot.
    pub fn update(&self, occupancy: Occupancy) {
        *self.occupancy.write().unwrap_or_else(PoisonError::into_inner) = occupancy;
    }

    /// Copy of the last sensed occupancy.
    pub fn occupancy(&self) -> Occupancy {
        *self.occupancy.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Light exactly `lit` on the board.
    pub async fn send_leds(&self, lit: &LitSquares) -> Result<()> {
        let command = lit.led_command();
        trace!(lit = lit.len(), "Sending LED command");

        let mut leds = self.leds.lock().await;
        leds.write_all(&command)
            .await
            .map_err(|e| BridgeError::link_failed_with_source("LED write failed", e))?;
        leds.flush().await.map_err(|e| BridgeError::link_failed_with_source("LED flush failed", e))
    }

    /// Game start animation, then restore `lit`.
    pub async fn play_start_sequence(&self, lit: &LitSquares) -> Result<()> {
        debug!("Playing start sequence");
        self.send_leds(&LitSquares::from_iter([START_SEQUENCE[0]])).await?;
        tokio::time::sleep(self.start_period).await;

        for pair in START_SEQUENCE.windows(2) {
            self.send_leds(&pair.iter().copied().collect()).await?;
            tokio::time::sleep(self.start_period).await;
        }

        self.send_leds(&LitSquares::from_iter([START_SEQUENCE[START_SEQUENCE.len() - 1]])).await?;
        tokio::time::sleep(self.start_period).await;

        self.send_leds(lit).await
    }

    /// Game end animation: blink the centre, then leave everything off.
    pub async fn play_end_sequence(&self) -> Result<()> {
        debug!("Playing end sequence");
        let centre: LitSquares = END_SEQUENCE.into_iter().collect();
        let off = LitSquares::new();

        for _ in 0..END_SEQUENCE_BLINKS {
            self.send_leds(&centre).await?;
            tokio::time::sleep(self.end_period).await;
            self.send_leds(&off).await?;
            tokio::time::sleep(self.end_period).await;
        }
        Ok(())
    }
}
