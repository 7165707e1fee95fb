//! HTTP client for the lichess board API

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::types::{GameEvent, NowPlaying, PlayerProfile, PlayingGame, parse_event_line};
use super::{RemoteGame, SeekHandle, SeekRequest};
use crate::{BridgeError, Result};

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://lichess.org/api";

/// Buffered events between the stream reader and the orchestrator.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Board API client authenticated with a personal token.
#[derive(Clone)]
pub struct LichessClient {
    client: Client,
    api_base: String,
    token: String,
}

impl LichessClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        // No overall timeout: game and seek streams stay open for the whole game
        let client = Client::builder()
            .user_agent(concat!("echess/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn get(&self, operation: &str, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        trace!(%operation, %path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        check_status(operation, response).await
    }

    async fn post(&self, operation: &str, path: &str, form: &[(&str, String)]) -> Result<Response> {
        trace!(%operation, %path, "POST");
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .form(form)
            .send()
            .await?;
        check_status(operation, response).await
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BridgeError::remote_failed(operation, Some(status.as_u16()), format!("HTTP {status}: {body}")))
}

/// Remove every complete line from `buffer`, leaving a partial tail in place.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buffer.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let complete: Vec<u8> = buffer.drain(..=last_newline).collect();
    complete
        .split(|&b| b == b'\n')
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Forward one stream line, logging and skipping what cannot be parsed.
async fn forward_line(line: &str, events: &mpsc::Sender<GameEvent>) -> bool {
    match parse_event_line(line) {
        Ok(Some(event)) => events.send(event).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            warn!(%line, "Skipping game stream line: {}", e);
            true
        }
    }
}

async fn read_game_stream(game_id: String, response: Response, events: mpsc::Sender<GameEvent>) {
    let mut body = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                error!(%game_id, "Game stream read failed: {}", e);
                return;
            }
        };
        buffer.extend_from_slice(&chunk);

        for line in drain_lines(&mut buffer) {
            if !forward_line(&line, &events).await {
                debug!(%game_id, "Event receiver dropped, closing game stream");
                return;
            }
        }
    }

    // A last line without a trailing newline
    let tail = String::from_utf8_lossy(&buffer).into_owned();
    if !forward_line(&tail, &events).await {
        return;
    }

    info!(%game_id, "Game stream ended");
    let _ = events.send(GameEvent::GameEnded).await;
}

async fn hold_seek(response: Response, cancel: CancellationToken) {
    let mut body = response.bytes_stream();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Seek cancelled");
                return;
            }
            chunk = body.next() => match chunk {
                Some(Ok(_)) => trace!("Seek is alive"),
                Some(Err(e)) => {
                    warn!("Seek stream failed: {}", e);
                    return;
                }
                None => {
                    info!("Seek stream ended");
                    return;
                }
            },
        }
    }
}

#[async_trait]
impl RemoteGame for LichessClient {
    async fn find_current_game(&self) -> Result<Option<PlayingGame>> {
        let response = self.get("find current game", "account/playing", &[("nb", "1")]).await?;
        let playing: NowPlaying = response.json().await?;
        Ok(playing.now_playing.into_iter().next())
    }

    async fn stream_game(&self, game_id: &str) -> Result<mpsc::Receiver<GameEvent>> {
        let response = self
            .get("stream game", &format!("board/game/stream/{game_id}"), &[])
            .await
            .map_err(|e| BridgeError::stream_failed(game_id, e.to_string()))?;
        info!(%game_id, "Game stream opened");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(read_game_stream(game_id.to_string(), response, events_tx));
        Ok(events_rx)
    }

    async fn submit_move(&self, game_id: &str, mv: &str) -> Result<()> {
        self.post("submit move", &format!("board/game/{game_id}/move/{mv}"), &[]).await?;
        Ok(())
    }

    async fn resign(&self, game_id: &str) -> Result<()> {
        self.post("resign", &format!("board/game/{game_id}/resign"), &[]).await?;
        Ok(())
    }

    async fn abort(&self, game_id: &str) -> Result<()> {
        self.post("abort", &format!("board/game/{game_id}/abort"), &[]).await?;
        Ok(())
    }

    async fn offer_draw(&self, game_id: &str) -> Result<()> {
        self.post("offer draw", &format!("board/game/{game_id}/draw/yes"), &[]).await?;
        Ok(())
    }

    async fn claim_victory(&self, game_id: &str) -> Result<()> {
        self.post("claim victory", &format!("board/game/{game_id}/claim-victory"), &[]).await?;
        Ok(())
    }

    async fn create_seek(&self, seek: SeekRequest) -> Result<SeekHandle> {
        let form = [
            ("time", seek.time.to_string()),
            ("increment", seek.increment.to_string()),
            ("rated", seek.rated.to_string()),
            ("variant", "standard".to_string()),
            ("ratingRange", String::new()),
        ];
        let response = self.post("create seek", "board/seek", &form).await?;
        info!(time = seek.time, increment = seek.increment, rated = seek.rated, "Seek created");

        let cancel = CancellationToken::new();
        tokio::spawn(hold_seek(response, cancel.clone()));
        Ok(SeekHandle::new(cancel))
    }

    async fn fetch_profile(&self) -> Result<PlayerProfile> {
        let response = self.get("fetch profile", "account", &[]).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_base_and_path() {
        let client = LichessClient::new("https://lichess.org/api/", "token").unwrap();
        assert_eq!(client.url("board/seek"), "https://lichess.org/api/board/seek");
        assert_eq!(
            client.url("board/game/stream/abcd1234"),
            "https://lichess.org/api/board/game/stream/abcd1234"
        );
    }

    #[test]
    fn complete_lines_are_drained() {
        let mut buffer = b"{\"type\":\"chatLine\"}\n\n{\"type\":\"game".to_vec();
        let lines = drain_lines(&mut buffer);

        assert_eq!(lines, vec!["{\"type\":\"chatLine\"}".to_string()]);
        assert_eq!(buffer, b"{\"type\":\"game".to_vec());

        buffer.extend_from_slice(b"State\"}\n");
        assert_eq!(drain_lines(&mut buffer), vec!["{\"type\":\"gameState\"}".to_string()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn keep_alive_newlines_yield_nothing() {
        let mut buffer = b"\n\n\n".to_vec();
        assert!(drain_lines(&mut buffer).is_empty());
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn unparseable_lines_are_skipped() {
        let (tx, mut rx) = mpsc::channel(4);

        assert!(forward_line("{broken", &tx).await);
        assert!(forward_line(r#"{"type":"mystery"}"#, &tx).await);
        assert!(forward_line(r#"{"type":"gameState","moves":"e2e4","wtime":1,"btime":1,"status":"started"}"#, &tx).await);
        drop(tx);

        assert!(matches!(rx.recv().await, Some(GameEvent::GameState(_))));
        assert!(rx.recv().await.is_none());
    }
}
