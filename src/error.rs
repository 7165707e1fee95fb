//! Error types for the board bridge.
//!
//! Errors are grouped by how the rest of the bridge reacts to them:
//!
//! - **Transport-fatal**: the serial link or the remote game stream failed.
//!   The affected task ends; reconnecting is left to the caller.
//! - **Protocol-recoverable**: a malformed NDJSON line or an unknown event
//!   type. Logged and skipped, the stream keeps going.
//! - **Remote-call failures**: an HTTP verb (submit move, claim victory, ...)
//!   failed. Logged, never retried automatically.
//! - **Configuration**: config or credential files could not be loaded.
//!
//! Illegal inferred moves, ambiguous lit squares and superseded candidates are
//! *not* errors. They are ordinary values of [`crate::Inference`] and
//! [`crate::CommitOutcome`].
//!
//! ```rust
//! use echess::BridgeError;
//!
//! let error = BridgeError::remote_failed("submit move", Some(429), "too many requests");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Board link failed: {reason}")]
    Link {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Game stream {game_id} failed: {reason}")]
    Stream { game_id: String, reason: String },

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Remote call '{operation}' failed: {reason}")]
    Remote { operation: String, status: Option<u16>, reason: String },

    #[error("Illegal move '{mv}': {reason}")]
    IllegalMove { mv: String, reason: String },

    #[error("Configuration error in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("Could not load credentials from {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },
}

impl BridgeError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Remote { status, .. } => {
                // 4xx other than rate limiting means the request itself is wrong
                !matches!(status, Some(code) if (400..500).contains(code) && *code != 429)
            }
            BridgeError::Protocol { .. } => true,
            BridgeError::Link { .. } => false,
            BridgeError::Stream { .. } => false,
            BridgeError::IllegalMove { .. } => false,
            BridgeError::Config { .. } => false,
            BridgeError::Credentials { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::Link { .. } => vec![
                "Check the USB cable between the board and the computer",
                "Verify the serial device is not opened by another program",
                "Restart the bridge after reconnecting the board",
            ],
            BridgeError::Stream { .. } => vec![
                "Check network connectivity",
                "Restart the bridge to reopen the game stream",
            ],
            BridgeError::Protocol { .. } => vec![
                "Check for a newer version of the bridge",
                "Report the offending line if the problem persists",
            ],
            BridgeError::Remote { .. } => vec![
                "Check network connectivity",
                "Verify the API token has the board:play scope",
                "Replay the move on the physical board",
            ],
            BridgeError::IllegalMove { .. } => vec![
                "Wait for the next game state update",
                "Restart the bridge to rebuild the position",
            ],
            BridgeError::Config { .. } => vec![
                "Check the config file is valid YAML",
                "Remove unknown keys from the config file",
            ],
            BridgeError::Credentials { .. } => vec![
                "Create the secret file with a LICHESS_API_TOKEN entry",
                "Or export LICHESS_API_TOKEN in the environment",
            ],
        }
    }

    /// Helper constructor for serial link failures.
    pub fn link_failed(reason: impl Into<String>) -> Self {
        BridgeError::Link { reason: reason.into(), source: None }
    }

    /// Helper constructor for serial link failures with an I/O source.
    pub fn link_failed_with_source(reason: impl Into<String>, source: std::io::Error) -> Self {
        BridgeError::Link { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for game stream failures.
    pub fn stream_failed(game_id: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Stream { game_id: game_id.into(), reason: reason.into() }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        BridgeError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for remote call failures.
    pub fn remote_failed(
        operation: impl Into<String>,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        BridgeError::Remote { operation: operation.into(), status, reason: reason.into() }
    }

    /// Helper constructor for moves rejected by the rules engine.
    pub fn illegal_move(mv: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::IllegalMove { mv: mv.into(), reason: reason.into() }
    }

    /// Helper constructor for config errors.
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BridgeError::Config { path: path.into(), reason: reason.into() }
    }

    /// Helper constructor for credential errors.
    pub fn credentials(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BridgeError::Credentials { path: path.into(), reason: reason.into() }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Link { reason: err.to_string(), source: Some(err) }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Remote {
            operation: err.url().map(|u| u.path().to_string()).unwrap_or_default(),
            status: err.status().map(|s| s.as_u16()),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            mv in "[a-h][1-8][a-h][1-8]",
            game_id in "\\w{8}",
            status in 100u16..600u16
          ) {
            let link = BridgeError::link_failed(reason.clone());
            prop_assert!(link.to_string().contains(&reason));

            let illegal = BridgeError::illegal_move(mv.clone(), reason.clone());
            prop_assert!(illegal.to_string().contains(&mv));

            let stream = BridgeError::stream_failed(game_id.clone(), reason.clone());
            prop_assert!(stream.to_string().contains(&game_id));

            let remote = BridgeError::remote_failed("submit move", Some(status), reason.clone());
            prop_assert!(remote.to_string().contains("submit move"));
          }
        }
    }

    #[test]
    fn io_errors_become_link_failures() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "port closed");
        let err: BridgeError = io_err.into();

        match err {
            BridgeError::Link { source: Some(source), .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("Expected Link error, got {other:?}"),
        }
    }

    #[test]
    fn retry_classification() {
        assert!(!BridgeError::link_failed("eof").is_retryable());
        assert!(!BridgeError::stream_failed("abcd1234", "reset").is_retryable());
        assert!(BridgeError::protocol("game stream", "bad json").is_retryable());
        assert!(BridgeError::remote_failed("claim victory", Some(503), "unavailable").is_retryable());
        assert!(BridgeError::remote_failed("claim victory", Some(429), "slow down").is_retryable());
        assert!(!BridgeError::remote_failed("submit move", Some(400), "illegal").is_retryable());
        assert!(BridgeError::remote_failed("submit move", None, "connect").is_retryable());
    }

    #[test]
    fn every_variant_has_suggestions() {
        let errors = [
            BridgeError::link_failed("x"),
            BridgeError::stream_failed("g", "x"),
            BridgeError::protocol("c", "d"),
            BridgeError::remote_failed("op", None, "x"),
            BridgeError::illegal_move("e2e5", "x"),
            BridgeError::config("config.yaml", "x"),
            BridgeError::credentials("secret.json", "x"),
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "{error} has no suggestions");
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<BridgeError>();
    }
}
