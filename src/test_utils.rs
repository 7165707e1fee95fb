//! Test helpers: frame builders and an in-memory game service
//!
//! Shared by unit tests, integration tests and benches, so everything here
//! builds without network access or a physical board.

#![cfg(any(test, feature = "benchmark"))]

use async_trait::async_trait;
use shakmaty::Chess;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::game::replay;
use crate::remote::{GameEvent, GameStateEvent, PlayerProfile, PlayingGame, RemoteGame, SeekHandle, SeekRequest};
use crate::types::{BoardFrame, Occupancy};
use crate::{BridgeError, Result};

/// Occupancy of a correctly set up board.
pub fn start_position_occupancy() -> Occupancy {
    Occupancy::from_position(&Chess::default())
}

/// Occupancy of a board on which `moves` were played from the initial position.
pub fn occupancy_after(moves: &[&str]) -> Occupancy {
    match replay(moves) {
        Ok(position) => Occupancy::from_position(&position),
        Err(e) => panic!("test move list does not replay: {e}"),
    }
}

/// Bytes the board would send for `occupancy`.
pub fn wire_frame(occupancy: &Occupancy) -> Vec<u8> {
    BoardFrame::encode(occupancy).to_wire().to_vec()
}

/// Concatenated frames for a sequence of snapshots.
pub fn wire_frames<'a>(snapshots: impl IntoIterator<Item = &'a Occupancy>) -> Vec<u8> {
    snapshots.into_iter().flat_map(wire_frame).collect()
}

/// Game stream state event with generous clocks.
pub fn game_state(moves: &str, status: &str) -> GameStateEvent {
    GameStateEvent {
        moves: moves.to_string(),
        wtime: 600_000,
        btime: 600_000,
        status: status.to_string(),
        winner: None,
    }
}

/// A game in progress as the lookup would return it.
pub fn playing_game(game_id: &str, color: &str) -> PlayingGame {
    PlayingGame {
        full_id: format!("{game_id}full"),
        game_id: game_id.to_string(),
        color: color.to_string(),
        ..PlayingGame::default()
    }
}

/// Remote call recorded by [`RecordingRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    SubmitMove { game_id: String, mv: String },
    Resign(String),
    Abort(String),
    OfferDraw(String),
    ClaimVictory(String),
}

#[derive(Default)]
struct Script {
    games: VecDeque<PlayingGame>,
    streams: HashMap<String, mpsc::Receiver<GameEvent>>,
    calls: Vec<RemoteCall>,
    seeks: Vec<(SeekRequest, CancellationToken)>,
    profile: Option<PlayerProfile>,
}

/// In-memory [`RemoteGame`] that records calls and serves scripted games.
#[derive(Default)]
pub struct RecordingRemote {
    script: Mutex<Script>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a game for the next lookup. Events sent on the returned channel
    /// are delivered on that game's stream.
    pub fn script_game(&self, game: PlayingGame) -> mpsc::Sender<GameEvent> {
        let (tx, rx) = mpsc::channel(64);
        let mut script = self.script();
        script.streams.insert(game.game_id.clone(), rx);
        script.games.push_back(game);
        tx
    }

    /// Profile returned by `fetch_profile`, as the service's JSON.
    pub fn set_profile(&self, json: &str) {
        match serde_json::from_str(json) {
            Ok(profile) => self.script().profile = Some(profile),
            Err(e) => panic!("invalid profile fixture: {e}"),
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.script().calls.clone()
    }

    /// Moves submitted so far, in order.
    pub fn submitted_moves(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::SubmitMove { mv, .. } => Some(mv),
                _ => None,
            })
            .collect()
    }

    /// Cancel tokens of every seek created, in order.
    pub fn seeks(&self) -> Vec<CancellationToken> {
        self.script().seeks.iter().map(|(_, token)| token.clone()).collect()
    }

    pub fn seek_requests(&self) -> Vec<SeekRequest> {
        self.script().seeks.iter().map(|(request, _)| *request).collect()
    }

    fn record(&self, call: RemoteCall) {
        self.script().calls.push(call);
    }
}

#[async_trait]
impl RemoteGame for RecordingRemote {
    async fn find_current_game(&self) -> Result<Option<PlayingGame>> {
        Ok(self.script().games.pop_front())
    }

    async fn stream_game(&self, game_id: &str) -> Result<mpsc::Receiver<GameEvent>> {
        self.script()
            .streams
            .remove(game_id)
            .ok_or_else(|| BridgeError::stream_failed(game_id, "no scripted stream"))
    }

    async fn submit_move(&self, game_id: &str, mv: &str) -> Result<()> {
        self.record(RemoteCall::SubmitMove { game_id: game_id.to_string(), mv: mv.to_string() });
        Ok(())
    }

    async fn resign(&self, game_id: &str) -> Result<()> {
        self.record(RemoteCall::Resign(game_id.to_string()));
        Ok(())
    }

    async fn abort(&self, game_id: &str) -> Result<()> {
        self.record(RemoteCall::Abort(game_id.to_string()));
        Ok(())
    }

    async fn offer_draw(&self, game_id: &str) -> Result<()> {
        self.record(RemoteCall::OfferDraw(game_id.to_string()));
        Ok(())
    }

    async fn claim_victory(&self, game_id: &str) -> Result<()> {
        self.record(RemoteCall::ClaimVictory(game_id.to_string()));
        Ok(())
    }

    async fn create_seek(&self, seek: SeekRequest) -> Result<SeekHandle> {
        let token = CancellationToken::new();
        self.script().seeks.push((seek, token.clone()));
        Ok(SeekHandle::new(token))
    }

    async fn fetch_profile(&self) -> Result<PlayerProfile> {
        self.script()
            .profile
            .clone()
            .ok_or_else(|| BridgeError::remote_failed("fetch profile", Some(404), "no scripted profile"))
    }
}
