//! Settle-window debouncing of inferred moves
//!
//! Sliding a piece produces a burst of occupancy snapshots, each of which may
//! infer a different move. The [`Debouncer`] only submits a move once it has
//! been the recorded candidate for a full settle window.
//!
//! Every new non-empty candidate schedules one re-check. Re-checks are never
//! cancelled: a stale one notices that the candidate changed and does
//! nothing. The identity comparison, the settle check and the reset of the
//! candidate happen under one lock; the submission happens after it is
//! released.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::Result;

/// Default settle window.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(250);

/// Sink for committed moves.
#[async_trait]
pub trait MoveSubmitter: Send + Sync + 'static {
    async fn submit(&self, game_id: &str, mv: &str) -> Result<()>;
}

/// The move currently believed to be in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMove {
    /// UCI move, empty when the board agrees with the game
    pub mv: String,
    pub issued_at: Instant,
}

impl CandidateMove {
    fn idle() -> Self {
        Self { mv: String::new(), issued_at: Instant::now() }
    }
}

/// What a settle re-check decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Another move was offered since this check was scheduled
    Superseded,
    /// The same move was re-offered; a later check will decide
    TooSoon,
    /// Nothing to commit
    Empty,
    /// The move was handed to the submitter
    Committed(String),
}

struct Shared {
    candidate: Mutex<CandidateMove>,
    game_id: Mutex<String>,
    settle_window: Duration,
    submitter: Arc<dyn MoveSubmitter>,
}

/// Turns a stream of inferred moves into at most one submission per settled move.
#[derive(Clone)]
pub struct Debouncer {
    shared: Arc<Shared>,
}

impl Debouncer {
    pub fn new(submitter: Arc<dyn MoveSubmitter>, settle_window: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                candidate: Mutex::new(CandidateMove::idle()),
                game_id: Mutex::new(String::new()),
                settle_window,
                submitter,
            }),
        }
    }

    /// Game that committed moves are submitted to.
    pub fn set_game(&self, game_id: impl Into<String>) {
        *lock(&self.shared.game_id) = game_id.into();
    }

    pub fn settle_window(&self) -> Duration {
        self.shared.settle_window
    }

    /// Record the latest inference. An empty move cancels the pending one.
    ///
    /// Returns the handle of the scheduled re-check when a new non-empty
    /// candidate was recorded.
    pub fn offer(&self, mv: &str) -> Option<JoinHandle<CommitOutcome>> {
        {
            let mut candidate = lock(&self.shared.candidate);
            if candidate.mv == mv {
                return None;
            }
            trace!(from = %candidate.mv, to = %mv, "Candidate move changed");
            *candidate = CandidateMove { mv: mv.to_string(), issued_at: Instant::now() };
        }

        if mv.is_empty() {
            return None;
        }

        let deadline = Instant::now() + self.shared.settle_window + Duration::from_millis(1);
        let debouncer = self.clone();
        let mv = mv.to_string();
        Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            debouncer.recheck(&mv).await
        }))
    }

    /// Commit `mv` if it is still the candidate and has been for a full settle window.
    pub async fn recheck(&self, mv: &str) -> CommitOutcome {
        let outcome = {
            let mut candidate = lock(&self.shared.candidate);
            if candidate.mv != mv {
                CommitOutcome::Superseded
            } else if candidate.issued_at.elapsed() < self.shared.settle_window {
                CommitOutcome::TooSoon
            } else if mv.is_empty() {
                CommitOutcome::Empty
            } else {
                *candidate = CandidateMove::idle();
                CommitOutcome::Committed(mv.to_string())
            }
        };

        match &outcome {
            CommitOutcome::Committed(mv) => self.submit(mv).await,
            other => trace!(%mv, outcome = ?other, "Settle re-check"),
        }
        outcome
    }

    /// Forget any pending candidate.
    pub fn reset(&self) {
        *lock(&self.shared.candidate) = CandidateMove::idle();
    }

    /// Snapshot of the current candidate.
    pub fn candidate(&self) -> CandidateMove {
        lock(&self.shared.candidate).clone()
    }

    async fn submit(&self, mv: &str) {
        let game_id = lock(&self.shared.game_id).clone();
        if game_id.is_empty() {
            warn!(%mv, "Settled move with no active game, dropping it");
            return;
        }

        info!(%game_id, %mv, "Submitting move");
        // Not retried: the candidate is already cleared and the move can be
        // made again on the board.
        match self.shared.submitter.submit(&game_id, mv).await {
            Ok(()) => debug!(%mv, "Move accepted"),
            Err(e) => error!(%game_id, %mv, "Move submission failed: {}", e),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;
    use tokio::time::advance;

    #[derive(Default)]
    struct Recorder {
        submitted: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Recorder {
        fn submitted(&self) -> Vec<(String, String)> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MoveSubmitter for Recorder {
        async fn submit(&self, game_id: &str, mv: &str) -> Result<()> {
            self.submitted.lock().unwrap().push((game_id.to_string(), mv.to_string()));
            if self.fail {
                return Err(BridgeError::remote_failed("submit move", Some(400), "illegal"));
            }
            Ok(())
        }
    }

    fn debouncer(recorder: &Arc<Recorder>) -> Debouncer {
        let debouncer = Debouncer::new(recorder.clone(), DEFAULT_SETTLE_WINDOW);
        debouncer.set_game("abcd1234");
        debouncer
    }

    #[tokio::test(start_paused = true)]
    async fn settled_move_is_committed_once() {
        let recorder = Arc::new(Recorder::default());
        let debouncer = debouncer(&recorder);

        let check = debouncer.offer("e2e4").unwrap();
        assert_eq!(check.await.unwrap(), CommitOutcome::Committed("e2e4".into()));
        assert_eq!(recorder.submitted(), vec![("abcd1234".to_string(), "e2e4".to_string())]);
        assert_eq!(debouncer.candidate().mv, "");
    }

    #[tokio::test(start_paused = true)]
    async fn hovering_commits_at_most_once() {
        let recorder = Arc::new(Recorder::default());
        let debouncer = debouncer(&recorder);
        let start = Instant::now();

        let first = debouncer.offer("e2e4").unwrap();
        advance(Duration::from_millis(50)).await;
        assert!(debouncer.offer("e2e4").is_none());
        advance(Duration::from_millis(50)).await;
        assert!(debouncer.offer("").is_none());
        advance(Duration::from_millis(50)).await;
        let last = debouncer.offer("e2e4").unwrap();

        assert_eq!(first.await.unwrap(), CommitOutcome::TooSoon);
        assert!(recorder.submitted().is_empty());

        assert_eq!(last.await.unwrap(), CommitOutcome::Committed("e2e4".into()));
        assert!(start.elapsed() >= Duration::from_millis(150) + DEFAULT_SETTLE_WINDOW);
        assert_eq!(recorder.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_move_supersedes_pending_one() {
        let recorder = Arc::new(Recorder::default());
        let debouncer = debouncer(&recorder);

        let e4 = debouncer.offer("e2e4").unwrap();
        advance(Duration::from_millis(100)).await;
        let d4 = debouncer.offer("d2d4").unwrap();

        assert_eq!(e4.await.unwrap(), CommitOutcome::Superseded);
        assert_eq!(d4.await.unwrap(), CommitOutcome::Committed("d2d4".into()));
        assert_eq!(recorder.submitted(), vec![("abcd1234".to_string(), "d2d4".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_offer_cancels_pending_move() {
        let recorder = Arc::new(Recorder::default());
        let debouncer = debouncer(&recorder);

        let check = debouncer.offer("e2e4").unwrap();
        advance(Duration::from_millis(100)).await;
        assert!(debouncer.offer("").is_none());

        assert_eq!(check.await.unwrap(), CommitOutcome::Superseded);

        // Still inside the empty candidate's settle window
        assert_eq!(debouncer.recheck("").await, CommitOutcome::TooSoon);
        advance(DEFAULT_SETTLE_WINDOW).await;
        assert_eq!(debouncer.recheck("").await, CommitOutcome::Empty);
        assert!(recorder.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_pending_move() {
        let recorder = Arc::new(Recorder::default());
        let debouncer = debouncer(&recorder);

        let check = debouncer.offer("g1f3").unwrap();
        debouncer.reset();

        assert_eq!(check.await.unwrap(), CommitOutcome::Superseded);
        assert!(recorder.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_is_not_retried() {
        let recorder = Arc::new(Recorder { fail: true, ..Default::default() });
        let debouncer = debouncer(&recorder);

        let check = debouncer.offer("e2e4").unwrap();
        assert_eq!(check.await.unwrap(), CommitOutcome::Committed("e2e4".into()));

        advance(Duration::from_secs(1)).await;
        assert_eq!(recorder.submitted().len(), 1);
        assert_eq!(debouncer.candidate().mv, "");
    }

    #[tokio::test(start_paused = true)]
    async fn no_game_means_no_submission() {
        let recorder = Arc::new(Recorder::default());
        let debouncer = Debouncer::new(recorder.clone(), DEFAULT_SETTLE_WINDOW);

        let check = debouncer.offer("e2e4").unwrap();
        assert_eq!(check.await.unwrap(), CommitOutcome::Committed("e2e4".into()));
        assert!(recorder.submitted().is_empty());
    }
}
