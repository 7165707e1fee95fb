//! Wire types of the remote game service

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use crate::{BridgeError, Result};

/// Response of the "games in progress" endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    #[serde(default)]
    pub now_playing: Vec<PlayingGame>,
}

/// A game the account is currently playing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayingGame {
    pub full_id: String,
    pub game_id: String,
    /// "white" or "black"
    pub color: String,
    pub fen: String,
    pub opponent: Opponent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Opponent {
    pub id: Option<String>,
    pub username: String,
    pub rating: Option<u32>,
}

/// Clocks, moves and status of a running game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameStateEvent {
    /// Space-separated UCI moves since the initial position
    pub moves: String,
    /// White's remaining time in milliseconds
    pub wtime: u64,
    /// Black's remaining time in milliseconds
    pub btime: u64,
    pub status: String,
    /// "white" or "black" once the game is decided
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatLineEvent {
    pub room: String,
    pub text: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpponentGoneEvent {
    pub gone: bool,
    pub claim_win_in_seconds: Option<i64>,
}

impl OpponentGoneEvent {
    /// The opponent left and the grace countdown has run out.
    pub fn can_claim_victory(&self) -> bool {
        self.gone && self.claim_win_in_seconds.is_some_and(|s| s <= 0)
    }
}

/// First event of a game stream; only its embedded state is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GameFullEvent {
    pub id: String,
    pub state: GameStateEvent,
}

/// Event delivered on a game stream.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    ChatLine(ChatLineEvent),
    OpponentGone(OpponentGoneEvent),
    GameState(GameStateEvent),
    /// The stream closed: the game is over
    GameEnded,
}

#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    kind: String,
}

/// Parse one NDJSON line of a game stream.
///
/// Blank keep-alive lines yield `Ok(None)`. Malformed lines and unknown event
/// types are [`BridgeError::Protocol`]; callers log and skip them.
pub fn parse_event_line(line: &str) -> Result<Option<GameEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let malformed = |e: serde_json::Error| BridgeError::protocol("game stream", e.to_string());

    let tagged: Tagged = serde_json::from_str(line).map_err(malformed)?;
    trace!(kind = %tagged.kind, "Game stream event");

    let event = match tagged.kind.as_str() {
        "chatLine" => GameEvent::ChatLine(serde_json::from_str(line).map_err(malformed)?),
        "opponentGone" => GameEvent::OpponentGone(serde_json::from_str(line).map_err(malformed)?),
        "gameState" => GameEvent::GameState(serde_json::from_str(line).map_err(malformed)?),
        "gameFull" => {
            let full: GameFullEvent = serde_json::from_str(line).map_err(malformed)?;
            GameEvent::GameState(full.state)
        }
        other => {
            return Err(BridgeError::protocol(
                "game stream",
                format!("unknown event type '{other}'"),
            ));
        }
    };
    Ok(Some(event))
}

/// Rating categories, by expected game duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speed {
    UltraBullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
}

impl Speed {
    /// Category of a real-time game: `minutes * 60 + 40 * increment` seconds.
    pub fn from_clock(minutes: u32, increment: u32) -> Self {
        Self::from_estimate(minutes.saturating_mul(60).saturating_add(increment.saturating_mul(40)))
    }

    /// Category for an estimated game duration in seconds.
    pub fn from_estimate(seconds: u32) -> Self {
        match seconds {
            0..=29 => Speed::UltraBullet,
            30..=179 => Speed::Bullet,
            180..=479 => Speed::Blitz,
            480..=1499 => Speed::Rapid,
            _ => Speed::Classical,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Speed::UltraBullet => "ultraBullet",
            Speed::Bullet => "bullet",
            Speed::Blitz => "blitz",
            Speed::Rapid => "rapid",
            Speed::Classical => "classical",
            Speed::Correspondence => "correspondence",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Perf {
    pub games: u32,
    pub rating: u32,
    pub rd: u32,
    pub prog: i32,
    pub prov: bool,
}

/// Public profile of a player.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerProfile {
    pub id: String,
    pub username: String,
    pub perfs: HashMap<String, Perf>,
}

impl PlayerProfile {
    /// Whether the rating in `speed` is still provisional. Unplayed categories are.
    pub fn is_provisional(&self, speed: Speed) -> bool {
        self.perfs.get(speed.key()).is_none_or(|perf| perf.prov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_game_state() {
        let line = r#"{"type":"gameState","moves":"e2e4 e7e5","wtime":600000,"btime":598000,"winc":0,"binc":0,"status":"started"}"#;
        let event = parse_event_line(line).unwrap().unwrap();

        match event {
            GameEvent::GameState(state) => {
                assert_eq!(state.moves, "e2e4 e7e5");
                assert_eq!(state.wtime, 600000);
                assert_eq!(state.status, "started");
                assert_eq!(state.winner, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn game_full_surfaces_its_state() {
        let line = r#"{"type":"gameFull","id":"abcd1234","white":{"name":"a"},"black":{"name":"b"},"state":{"type":"gameState","moves":"d2d4","wtime":1,"btime":2,"status":"started"}}"#;
        let event = parse_event_line(line).unwrap().unwrap();
        assert!(matches!(event, GameEvent::GameState(ref s) if s.moves == "d2d4"));
    }

    #[test]
    fn parses_chat_and_opponent_gone() {
        let chat = parse_event_line(r#"{"type":"chatLine","room":"player","username":"bob","text":"gl hf"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(chat, GameEvent::ChatLine(ref c) if c.username == "bob"));

        let gone = parse_event_line(r#"{"type":"opponentGone","gone":true,"claimWinInSeconds":0}"#)
            .unwrap()
            .unwrap();
        match gone {
            GameEvent::OpponentGone(evt) => assert!(evt.can_claim_victory()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn opponent_gone_countdown_not_elapsed() {
        let pending = OpponentGoneEvent { gone: true, claim_win_in_seconds: Some(12) };
        let back = OpponentGoneEvent { gone: false, claim_win_in_seconds: None };
        assert!(!pending.can_claim_victory());
        assert!(!back.can_claim_victory());
    }

    #[test]
    fn blank_unknown_and_malformed_lines() {
        assert_eq!(parse_event_line("   ").unwrap(), None);
        assert!(matches!(
            parse_event_line(r#"{"type":"somethingNew"}"#),
            Err(BridgeError::Protocol { .. })
        ));
        assert!(matches!(parse_event_line("{not json"), Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn now_playing_response() {
        let body = r#"{"nowPlaying":[{"fullId":"abcd1234wxyz","gameId":"abcd1234","fen":"rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1","color":"black","lastMove":"","opponent":{"id":"alice","username":"Alice","rating":1500},"isMyTurn":false}]}"#;
        let parsed: NowPlaying = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.now_playing.len(), 1);
        assert_eq!(parsed.now_playing[0].game_id, "abcd1234");
        assert_eq!(parsed.now_playing[0].color, "black");
        assert_eq!(parsed.now_playing[0].opponent.rating, Some(1500));
    }

    #[test]
    fn provisional_ratings() {
        let provisional = r#"{"id":"igramnet","username":"igramnet","perfs":{"bullet":{"games":0,"rating":1500,"rd":500,"prog":0,"prov":true},"rapid":{"games":11,"rating":1875,"rd":113,"prog":0,"prov":true}},"kid":true}"#;
        let established = r#"{"id":"stodorov","username":"stodorov","perfs":{"blitz":{"games":21,"rating":1706,"rd":197,"prog":-97,"prov":true},"rapid":{"games":4264,"rating":1888,"rd":45,"prog":6}}}"#;

        let profile: PlayerProfile = serde_json::from_str(provisional).unwrap();
        assert!(profile.is_provisional(Speed::Rapid));

        let profile: PlayerProfile = serde_json::from_str(established).unwrap();
        assert!(!profile.is_provisional(Speed::Rapid));
        assert!(profile.is_provisional(Speed::Blitz));
        assert!(profile.is_provisional(Speed::Classical));
    }

    #[test]
    fn speed_from_clock() {
        assert_eq!(Speed::from_clock(1, 0), Speed::Bullet);
        assert_eq!(Speed::from_clock(3, 2), Speed::Blitz);
        assert_eq!(Speed::from_clock(10, 5), Speed::Rapid);
        assert_eq!(Speed::from_clock(15, 10), Speed::Rapid);
        assert_eq!(Speed::from_clock(30, 20), Speed::Classical);
    }

    #[test]
    fn speed_boundaries_belong_to_the_faster_category() {
        assert_eq!(Speed::from_estimate(29), Speed::UltraBullet);
        assert_eq!(Speed::from_estimate(30), Speed::Bullet);
        assert_eq!(Speed::from_estimate(179), Speed::Bullet);
        assert_eq!(Speed::from_estimate(180), Speed::Blitz);
        assert_eq!(Speed::from_estimate(479), Speed::Blitz);
        assert_eq!(Speed::from_estimate(480), Speed::Rapid);
        assert_eq!(Speed::from_estimate(1499), Speed::Rapid);
        assert_eq!(Speed::from_estimate(1500), Speed::Classical);
    }

    #[test]
    fn huge_clock_saturates_to_classical() {
        assert_eq!(Speed::from_clock(u32::MAX, u32::MAX), Speed::Classical);
        assert_eq!(Speed::from_clock(0, u32::MAX / 20), Speed::Classical);
    }
}
