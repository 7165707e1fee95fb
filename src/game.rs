//! Authoritative state of the game being played
//!
//! [`GameSession`] mirrors the remote game: identity, clocks, winner and the
//! ordered move list, plus the logical position obtained by replaying those
//! moves. It is read from the board path (turn and legality queries) far more
//! often than it is written from the game stream, hence the `RwLock`.

use shakmaty::uci::UciMove;
use shakmaty::{Chess, Color, Position};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::remote::{GameStateEvent, Opponent, PlayingGame};
use crate::{BridgeError, Result};

/// Result of checking a move string against the logical position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveCheck {
    pub valid: bool,
    /// Legal only with a promotion suffix; the piece must be chosen
    pub needs_promotion: bool,
}

impl MoveCheck {
    const INVALID: Self = Self { valid: false, needs_promotion: false };
}

/// How a finished game ended, from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Won,
    Lost,
    Drawn,
    Aborted,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    full_id: String,
    game_id: String,
    color: Option<Color>,
    opponent: Opponent,
    wtime: Option<u64>,
    btime: Option<u64>,
    clock_updated_at: Option<Instant>,
    status: String,
    winner: Option<Color>,
    moves: Vec<String>,
    position: Chess,
}

/// The single active game, or nothing when unbound.
#[derive(Debug, Default)]
pub struct GameSession {
    state: RwLock<SessionState>,
}

impl GameSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a game found by the remote lookup. Moves start empty and are
    /// filled in by the first state update of the stream.
    pub fn bind(&self, game: &PlayingGame) {
        let mut state = self.write();
        *state = SessionState {
            full_id: game.full_id.clone(),
            game_id: game.game_id.clone(),
            color: parse_color(&game.color),
            opponent: game.opponent.clone(),
            ..SessionState::default()
        };
        debug!(game_id = %state.game_id, color = ?state.color, "Session bound");
    }

    /// Apply an authoritative state update from the game stream.
    ///
    /// Clocks, status and winner are always replaced. The logical position is
    /// advanced by the newest move when the update extends the known list by
    /// exactly one; any other change is rebuilt by a full replay. A list that
    /// cannot be replayed is reported and the previous moves and position are
    /// kept.
    pub fn update(&self, event: &GameStateEvent) -> Result<()> {
        let moves: Vec<String> = event.moves.split_whitespace().map(str::to_owned).collect();

        let mut state = self.write();
        state.wtime = Some(event.wtime);
        state.btime = Some(event.btime);
        state.clock_updated_at = Some(Instant::now());
        state.status = event.status.clone();
        state.winner = event.winner.as_deref().and_then(parse_color);

        if moves == state.moves {
            return Ok(());
        }

        let advanced = match moves.split_last() {
            Some((newest, earlier)) if earlier == state.moves.as_slice() => {
                let mut position = state.position.clone();
                apply(&mut position, newest).ok().map(|()| position)
            }
            _ => None,
        };

        let position = match advanced {
            Some(position) => position,
            None => {
                warn!(
                    known = state.moves.len(),
                    received = moves.len(),
                    "Cannot advance by the newest move, replaying the whole game"
                );
                replay(&moves).inspect_err(|e| error!("Rejected move list: {}", e))?
            }
        };

        state.position = position;
        state.moves = moves;
        Ok(())
    }

    /// Check `mv` against a copy of the logical position.
    ///
    /// A four-character pawn advance onto the last rank that is only legal as
    /// a promotion is reported valid with `needs_promotion` set.
    pub fn validate_move(&self, mv: &str) -> MoveCheck {
        let position = self.read().position.clone();

        if try_move(&position, mv) {
            return MoveCheck { valid: true, needs_promotion: false };
        }

        if is_last_rank_advance(mv) && try_move(&position, &format!("{mv}q")) {
            return MoveCheck { valid: true, needs_promotion: true };
        }

        MoveCheck::INVALID
    }

    /// Side to move, by parity of the move list.
    pub fn current_turn(&self) -> Color {
        Color::from_white(self.read().moves.len() % 2 == 0)
    }

    pub fn is_my_turn(&self) -> bool {
        self.color() == Some(self.current_turn())
    }

    /// Back to the unbound state.
    pub fn reset(&self) {
        *self.write() = SessionState::default();
    }

    /// How the game ended, once the status says it has.
    pub fn outcome(&self) -> Option<GameOutcome> {
        let state = self.read();
        match state.status.as_str() {
            "" | "created" | "started" => None,
            "aborted" | "noStart" => Some(GameOutcome::Aborted),
            _ => Some(match (state.winner, state.color) {
                (None, _) => GameOutcome::Drawn,
                (Some(winner), Some(me)) if winner == me => GameOutcome::Won,
                (Some(_), _) => GameOutcome::Lost,
            }),
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.read().game_id.is_empty()
    }

    pub fn full_id(&self) -> String {
        self.read().full_id.clone()
    }

    pub fn game_id(&self) -> String {
        self.read().game_id.clone()
    }

    pub fn color(&self) -> Option<Color> {
        self.read().color
    }

    pub fn opponent(&self) -> Opponent {
        self.read().opponent.clone()
    }

    /// White's clock in milliseconds, `None` until the first update.
    pub fn wtime(&self) -> Option<u64> {
        self.read().wtime
    }

    /// Black's clock in milliseconds, `None` until the first update.
    pub fn btime(&self) -> Option<u64> {
        self.read().btime
    }

    pub fn clock_updated_at(&self) -> Option<Instant> {
        self.read().clock_updated_at
    }

    pub fn status(&self) -> String {
        self.read().status.clone()
    }

    pub fn winner(&self) -> Option<Color> {
        self.read().winner
    }

    pub fn moves(&self) -> Vec<String> {
        self.read().moves.clone()
    }

    pub fn position(&self) -> Chess {
        self.read().position.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse a color name as sent by the game service.
pub fn parse_color(name: &str) -> Option<Color> {
    match name {
        "white" => Some(Color::White),
        "black" => Some(Color::Black),
        _ => None,
    }
}

/// Position reached by playing `moves` from the initial position.
pub fn replay<S: AsRef<str>>(moves: &[S]) -> Result<Chess> {
    let mut position = Chess::default();
    for mv in moves {
        apply(&mut position, mv.as_ref())?;
    }
    Ok(position)
}

fn apply(position: &mut Chess, mv: &str) -> Result<()> {
    let uci: UciMove = mv.parse().map_err(|e| BridgeError::illegal_move(mv, format!("{e}")))?;
    let legal = uci.to_move(position).map_err(|e| BridgeError::illegal_move(mv, format!("{e}")))?;
    position.play_unchecked(legal);
    Ok(())
}

fn try_move(position: &Chess, mv: &str) -> bool {
    mv.parse::<UciMove>().is_ok_and(|uci| uci.to_move(position).is_ok())
}

fn is_last_rank_advance(mv: &str) -> bool {
    let bytes = mv.as_bytes();
    bytes.len() == 4 && matches!((bytes[1], bytes[3]), (b'7', b'8') | (b'2', b'1'))
}
