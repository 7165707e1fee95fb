//! Session orchestration
//!
//! The [`Orchestrator`] is the single consumer of board snapshots, game
//! stream events and promotion choices. Each handler runs to completion
//! before the next event is taken, so cross-component sequencing (update the
//! session, recompute lit squares, drive the LEDs, infer and debounce a move)
//! is decided in one place.
//!
//! Outside a game, [`Orchestrator::run`] polls the remote service for a game
//! in progress. UI intents other than promotion choices are served by a
//! separate task so that seeks and resignations never wait on the game loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::board::Board;
use crate::config::BridgeConfig;
use crate::debounce::Debouncer;
use crate::game::{GameOutcome, GameSession};
use crate::inference::{Inference, infer_move, lit_squares};
use crate::remote::{GameEvent, GameStateEvent, OpponentGoneEvent, PlayingGame, RemoteGame};
use crate::types::{LitSquares, Occupancy};
use crate::ui::{CoreUi, Notifier, PromotionChoice, SeekManager, UiIntent, UiNotification};
use crate::{BridgeError, Result};

/// Capacity of the queue carrying promotion choices to the game loop.
const PROMOTION_CHANNEL_CAPACITY: usize = 4;

/// A promotion prompt sent to the UI for a given pawn move.
#[derive(Debug, Clone)]
struct PendingPromotion {
    mv: String,
    requested_at: Instant,
    choice: Option<PromotionChoice>,
}

impl PendingPromotion {
    fn promoted(&self) -> Option<String> {
        self.choice.map(|choice| format!("{}{}", self.mv, choice.suffix()))
    }
}

/// What the intent task needs to act on UI requests.
struct IntentRouter<R> {
    remote: Arc<R>,
    session: Arc<GameSession>,
    seeks: Arc<SeekManager<R>>,
    promotions: mpsc::Sender<PromotionChoice>,
}

/// Drives one game at a time between the board, the game service and the UI.
pub struct Orchestrator<R, W> {
    remote: Arc<R>,
    board: Arc<Board<W>>,
    session: Arc<GameSession>,
    debouncer: Debouncer,
    notifier: Notifier,
    seeks: Arc<SeekManager<R>>,
    occupancy: watch::Receiver<Option<Arc<Occupancy>>>,
    intents: Option<mpsc::Receiver<UiIntent>>,
    promotions_tx: mpsc::Sender<PromotionChoice>,
    promotions: mpsc::Receiver<PromotionChoice>,
    lit: LitSquares,
    promotion: Option<PendingPromotion>,
    find_game_backoff: Duration,
    promotion_timeout: Duration,
    cancel: CancellationToken,
}

impl<R, W> Orchestrator<R, W>
where
    R: RemoteGame,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        remote: Arc<R>,
        board: Arc<Board<W>>,
        occupancy: watch::Receiver<Option<Arc<Occupancy>>>,
        ui: CoreUi,
        config: &BridgeConfig,
    ) -> Self {
        let (promotions_tx, promotions) = mpsc::channel(PROMOTION_CHANNEL_CAPACITY);
        let seeks = Arc::new(SeekManager::new(remote.clone(), ui.notifier.clone(), config.seek_cooldown()));
        let debouncer = Debouncer::new(remote.clone(), config.settle_window());

        Self {
            remote,
            board,
            session: Arc::new(GameSession::new()),
            debouncer,
            notifier: ui.notifier,
            seeks,
            occupancy,
            intents: Some(ui.intents),
            promotions_tx,
            promotions,
            lit: LitSquares::new(),
            promotion: None,
            find_game_backoff: config.find_game_backoff(),
            promotion_timeout: config.promotion_timeout(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token stopping [`run`](Self::run) and the intent task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> Arc<GameSession> {
        self.session.clone()
    }

    /// Lit squares as of the last board or game update.
    pub fn lit(&self) -> LitSquares {
        self.lit
    }

    /// Find games and play them until cancelled or the board link ends.
    ///
    /// A failed game stream or lookup is logged and retried after the
    /// backoff. Loss of the board link is returned.
    pub async fn run(mut self) -> Result<()> {
        let intent_task = self.spawn_intents();
        let result = self.find_games().await;
        self.cancel.cancel();
        if let Some(task) = intent_task {
            let _ = task.await;
        }
        result
    }

    async fn find_games(&mut self) -> Result<()> {
        info!("Looking for a game in progress");
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if self.occupancy.has_changed().is_err() {
                return Err(BridgeError::link_failed("board link ended"));
            }

            match self.remote.find_current_game().await {
                Ok(Some(game)) => match self.handle_game(game).await {
                    Ok(()) => continue,
                    Err(e @ BridgeError::Link { .. }) => return Err(e),
                    Err(e) => error!("Game ended abnormally: {}", e),
                },
                Ok(None) => {
                    debug!("No game in progress");
                    self.notifier.notify(UiNotification::NoCurrentGame).await;
                }
                Err(e) => warn!("Game lookup failed: {}", e),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.find_game_backoff) => {}
            }
        }
    }

    fn spawn_intents(&mut self) -> Option<JoinHandle<()>> {
        let intents = self.intents.take()?;
        let router = IntentRouter {
            remote: self.remote.clone(),
            session: self.session.clone(),
            seeks: self.seeks.clone(),
            promotions: self.promotions_tx.clone(),
        };
        Some(tokio::spawn(Self::run_intents(router, intents, self.cancel.clone())))
    }

    /// Serve UI intents until cancelled or the UI goes away.
    async fn run_intents(
        router: IntentRouter<R>,
        mut intents: mpsc::Receiver<UiIntent>,
        cancel: CancellationToken,
    ) {
        info!("Intent task started");
        loop {
            let intent = tokio::select! {
                _ = cancel.cancelled() => break,
                intent = intents.recv() => match intent {
                    Some(intent) => intent,
                    None => {
                        debug!("UI intent sender dropped");
                        break;
                    }
                },
            };
            info!(%intent, "UI intent");

            match intent {
                UiIntent::Seek { time, increment } => {
                    if let Err(e) = router.seeks.create_seek(time, increment).await {
                        error!("Could not create seek: {}", e);
                    }
                }
                UiIntent::CancelSeek => router.seeks.cancel_seek().await,
                UiIntent::Resign | UiIntent::Abort | UiIntent::OfferDraw => {
                    let game_id = router.session.game_id();
                    if game_id.is_empty() {
                        debug!(%intent, "No active game");
                        continue;
                    }
                    let result = match intent {
                        UiIntent::Resign => router.remote.resign(&game_id).await,
                        UiIntent::Abort => router.remote.abort(&game_id).await,
                        _ => router.remote.offer_draw(&game_id).await,
                    };
                    if let Err(e) = result {
                        error!(%game_id, %intent, "Remote call failed: {}", e);
                    }
                }
                UiIntent::Promote(choice) => {
                    if router.promotions.send(choice).await.is_err() {
                        debug!("Game loop gone, dropping promotion choice");
                    }
                }
            }
        }
        info!("Intent task ended");
    }

    /// Play one game from binding to the end of its event stream.
    ///
    /// Whatever the outcome, the session, lit squares and debouncer are reset
    /// and the LEDs cleared before returning.
    pub async fn handle_game(&mut self, game: PlayingGame) -> Result<()> {
        info!(
            game_id = %game.game_id,
            color = %game.color,
            opponent = %game.opponent.username,
            "Game found"
        );
        self.session.bind(&game);
        self.debouncer.reset();
        self.debouncer.set_game(game.game_id.as_str());
        self.seeks.settle().await;

        let result = match self.remote.stream_game(&game.game_id).await {
            Ok(events) => self.play(&game.game_id, events).await,
            Err(e) => Err(e),
        };

        self.clear_game().await;
        result
    }

    async fn play(&mut self, game_id: &str, mut events: mpsc::Receiver<GameEvent>) -> Result<()> {
        self.notifier.notify(UiNotification::GameStarted).await;
        self.refresh_lit();
        self.board.play_start_sequence(&self.lit).await?;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(%game_id, "Game loop cancelled");
                    return Ok(());
                }
                event = events.recv() => match event {
                    Some(GameEvent::ChatLine(chat)) => {
                        info!(room = %chat.room, "[{}]: {}", chat.username, chat.text);
                    }
                    Some(GameEvent::OpponentGone(gone)) => self.on_opponent_gone(game_id, &gone).await,
                    Some(GameEvent::GameState(state)) => self.on_game_state(&state).await?,
                    Some(GameEvent::GameEnded) => return self.on_game_ended().await,
                    None => return Err(BridgeError::stream_failed(game_id, "stream closed without game end")),
                },
                changed = self.occupancy.changed() => {
                    let snapshot = match changed {
                        Ok(()) => self.occupancy.borrow_and_update().clone(),
                        Err(_) => None,
                    };
                    match snapshot.as_deref() {
                        Some(occupancy) => self.on_board(*occupancy).await?,
                        None => return Err(BridgeError::link_failed("board link ended")),
                    }
                }
                Some(choice) = self.promotions.recv() => self.on_promotion(choice),
            }
        }
    }

    async fn on_opponent_gone(&self, game_id: &str, gone: &OpponentGoneEvent) {
        info!(gone = gone.gone, claim_in = ?gone.claim_win_in_seconds, "Opponent gone");
        if !gone.can_claim_victory() {
            return;
        }
        info!(%game_id, "Claiming victory");
        if let Err(e) = self.remote.claim_victory(game_id).await {
            error!(%game_id, "Could not claim victory: {}", e);
        }
    }

    async fn on_game_state(&mut self, state: &GameStateEvent) -> Result<()> {
        if let Err(e) = self.session.update(state) {
            warn!("Ignoring game state: {}", e);
        }
        self.refresh_lit();
        self.board.send_leds(&self.lit).await?;
        debug!(moves = self.session.moves().len(), status = %state.status, "Game updated");
        self.notifier.notify(UiNotification::MovesUpdated(self.session.moves())).await;
        Ok(())
    }

    async fn on_board(&mut self, occupancy: Occupancy) -> Result<()> {
        self.board.update(occupancy);
        self.refresh_lit();
        self.board.send_leds(&self.lit).await?;

        if !self.session.is_my_turn() {
            return Ok(());
        }

        let offer = match infer_move(&occupancy, &self.lit, &self.session) {
            Inference::None => String::new(),
            Inference::Move(mv) => {
                self.promotion = None;
                mv
            }
            Inference::NeedsPromotion(mv) => self.promotion_offer(mv).await,
        };
        self.debouncer.offer(&offer);
        Ok(())
    }

    /// Move to offer for a pawn waiting on its promotion piece. Empty until
    /// the UI has answered.
    async fn promotion_offer(&mut self, mv: String) -> String {
        match &mut self.promotion {
            Some(pending) if pending.mv == mv => {
                if let Some(promoted) = pending.promoted() {
                    return promoted;
                }
                if pending.requested_at.elapsed() >= self.promotion_timeout {
                    info!(%mv, "Promotion still unanswered, asking again");
                    pending.requested_at = Instant::now();
                    self.notifier.notify(UiNotification::PromotionRequested).await;
                }
                String::new()
            }
            _ => {
                info!(%mv, "Promotion needs a piece");
                self.promotion = Some(PendingPromotion { mv, requested_at: Instant::now(), choice: None });
                self.notifier.notify(UiNotification::PromotionRequested).await;
                String::new()
            }
        }
    }

    fn on_promotion(&mut self, choice: PromotionChoice) {
        let Some(pending) = self.promotion.as_mut() else {
            debug!(?choice, "Promotion choice with no pawn to promote");
            return;
        };
        pending.choice = Some(choice);
        if let Some(promoted) = pending.promoted() {
            info!(mv = %promoted, "Promotion chosen");
            self.debouncer.offer(&promoted);
        }
    }

    async fn on_game_ended(&mut self) -> Result<()> {
        info!(game_id = %self.session.game_id(), "Game ended");
        self.board.play_end_sequence().await?;

        let notification = match self.session.outcome() {
            Some(GameOutcome::Won) => UiNotification::GameWon,
            Some(GameOutcome::Lost) => UiNotification::GameLost,
            Some(GameOutcome::Drawn) => UiNotification::GameDrawn,
            Some(GameOutcome::Aborted) => UiNotification::GameAborted,
            None => {
                warn!(status = %self.session.status(), "Stream ended without a final status");
                return Ok(());
            }
        };
        self.notifier.notify(notification).await;
        Ok(())
    }

    fn refresh_lit(&mut self) {
        self.lit = lit_squares(&self.board.occupancy(), &self.session.position());
    }

    async fn clear_game(&mut self) {
        self.session.reset();
        self.debouncer.reset();
        self.debouncer.set_game("");
        self.promotion = None;
        self.lit = LitSquares::new();
        if let Err(e) = self.board.send_leds(&self.lit).await {
            error!("Could not clear LEDs: {}", e);
        }
    }
}
