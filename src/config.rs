//! Bridge configuration and credentials
//!
//! Configuration is a YAML file whose keys all have defaults, so an empty
//! file (or none at all) gives the reference timings. The API token is kept
//! apart in a small JSON secret file, or taken from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::decoder::DEFAULT_MAX_BUFFER;
use crate::remote::lichess::DEFAULT_API_BASE;
use crate::types::FRAME_WIRE_LEN;
use crate::{BridgeError, Result};

/// Environment variable holding the API token. Takes precedence over the secret file.
pub const TOKEN_ENV_VAR: &str = "LICHESS_API_TOKEN";

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Device path prefixes the board may show up under
    pub port_prefixes: Vec<String>,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_prefixes: vec![
                "/dev/ttyUSB0".to_string(),
                "/dev/tty.usbserial".to_string(),
                "/dev/cu.usbserial".to_string(),
            ],
            baud_rate: 115_200,
        }
    }
}

impl SerialConfig {
    /// First available port matching one of the configured prefixes.
    pub fn select_port<'a>(&self, available: &'a [String]) -> Option<&'a str> {
        available
            .iter()
            .find(|port| self.port_prefixes.iter().any(|prefix| port.starts_with(prefix.as_str())))
            .map(String::as_str)
    }
}

/// Timings, bounds and locations used by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// How long an inferred move must stay unchanged before it is submitted
    pub settle_window_ms: u64,
    /// Pause between two lookups of the current game
    pub find_game_backoff_ms: u64,
    /// Pause between cancelling a seek and opening the next one
    pub seek_cooldown_ms: u64,
    /// How long a promotion prompt stays open before it is asked again
    pub promotion_timeout_ms: u64,
    pub led_start_period_ms: u64,
    pub led_end_period_ms: u64,
    /// Upper bound of the serial frame buffer, in bytes
    pub max_frame_buffer: usize,
    pub ui_channel_capacity: usize,
    pub api_base: String,
    pub secret_path: PathBuf,
    /// `tracing_subscriber` filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
    pub serial: SerialConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            settle_window_ms: 250,
            find_game_backoff_ms: 3_000,
            seek_cooldown_ms: 200,
            promotion_timeout_ms: 30_000,
            led_start_period_ms: 20,
            led_end_period_ms: 300,
            max_frame_buffer: DEFAULT_MAX_BUFFER,
            ui_channel_capacity: 16,
            api_base: DEFAULT_API_BASE.to_string(),
            secret_path: PathBuf::from("secret.json"),
            log_filter: "info".to_string(),
            serial: SerialConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(path, format!("cannot read file: {e}")))?;
        let config = Self::from_yaml(&yaml, path)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate YAML. `origin` is only used in error messages.
    pub fn from_yaml(yaml: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let origin = origin.as_ref();
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml).map_err(|e| BridgeError::config(origin, e.to_string()))?
        };
        config.validate(origin)?;
        debug!(?config, "Configuration parsed");
        Ok(config)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        if self.settle_window_ms == 0 {
            return Err(BridgeError::config(origin, "settle_window_ms must be positive"));
        }
        if self.max_frame_buffer < FRAME_WIRE_LEN * 2 {
            return Err(BridgeError::config(
                origin,
                format!("max_frame_buffer must hold at least two frames ({} bytes)", FRAME_WIRE_LEN * 2),
            ));
        }
        if self.ui_channel_capacity == 0 {
            return Err(BridgeError::config(origin, "ui_channel_capacity must be positive"));
        }
        if self.api_base.trim().is_empty() {
            return Err(BridgeError::config(origin, "api_base is empty"));
        }
        Ok(())
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn find_game_backoff(&self) -> Duration {
        Duration::from_millis(self.find_game_backoff_ms)
    }

    pub fn seek_cooldown(&self) -> Duration {
        Duration::from_millis(self.seek_cooldown_ms)
    }

    pub fn promotion_timeout(&self) -> Duration {
        Duration::from_millis(self.promotion_timeout_ms)
    }

    pub fn led_start_period(&self) -> Duration {
        Duration::from_millis(self.led_start_period_ms)
    }

    pub fn led_end_period(&self) -> Duration {
        Duration::from_millis(self.led_end_period_ms)
    }
}

#[derive(Deserialize)]
struct SecretFile {
    #[serde(rename = "LICHESS_API_TOKEN")]
    api_token: String,
}

/// API token for the game service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("token", &"<redacted>").finish()
    }
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Token from the environment, or else from the secret file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::resolve(std::env::var(TOKEN_ENV_VAR).ok(), path)
    }

    /// Prefer `env_token` when set and non-empty, otherwise read `path`.
    pub fn resolve(env_token: Option<String>, path: impl AsRef<Path>) -> Result<Self> {
        if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
            debug!("Using API token from {}", TOKEN_ENV_VAR);
            return Ok(Self::new(token.trim()));
        }

        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::credentials(path, e.to_string()))?;
        let secret: SecretFile =
            serde_json::from_str(&data).map_err(|e| BridgeError::credentials(path, e.to_string()))?;

        if secret.api_token.trim().is_empty() {
            return Err(BridgeError::credentials(path, format!("{TOKEN_ENV_VAR} is empty")));
        }
        debug!(path = %path.display(), "Using API token from secret file");
        Ok(Self::new(secret.api_token.trim()))
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = BridgeConfig::from_yaml("", "inline").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.settle_window(), Duration::from_millis(250));
        assert_eq!(config.find_game_backoff(), Duration::from_secs(3));
        assert_eq!(config.seek_cooldown(), Duration::from_millis(200));
        assert_eq!(config.serial.baud_rate, 115_200);
    }

    #[test]
    fn partial_yaml_overrides_some_keys() {
        let yaml = "settle_window_ms: 400\nserial:\n  port_prefixes: [\"/dev/ttyACM\"]\n";
        let config = BridgeConfig::from_yaml(yaml, "inline").unwrap();

        assert_eq!(config.settle_window(), Duration::from_millis(400));
        assert_eq!(config.serial.port_prefixes, vec!["/dev/ttyACM".to_string()]);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        for yaml in ["settle_window_ms: 0", "max_frame_buffer: 19", "no_such_key: 1", "settle_window_ms: [1"] {
            let err = BridgeConfig::from_yaml(yaml, "inline").unwrap_err();
            assert!(matches!(err, BridgeError::Config { .. }), "{yaml}: {err:?}");
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "find_game_backoff_ms: 1000").unwrap();
        writeln!(file, "log_filter: \"echess=debug\"").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.find_game_backoff(), Duration::from_secs(1));
        assert_eq!(config.log_filter, "echess=debug");

        let err = BridgeConfig::load("/nonexistent/echess.yaml").unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }

    #[test]
    fn port_selection_uses_prefixes() {
        let serial = SerialConfig::default();
        let ports = vec!["/dev/ttyS0".to_string(), "/dev/cu.usbserial-1410".to_string()];
        assert_eq!(serial.select_port(&ports), Some("/dev/cu.usbserial-1410"));
        assert_eq!(serial.select_port(&["/dev/ttyS0".to_string()]), None);
    }

    #[test]
    fn credentials_from_secret_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"LICHESS_API_TOKEN": "lip_secret"}}"#).unwrap();

        let credentials = Credentials::resolve(None, file.path()).unwrap();
        assert_eq!(credentials.token(), "lip_secret");
        assert!(!format!("{credentials:?}").contains("lip_secret"));
    }

    #[test]
    fn environment_token_wins() {
        let credentials = Credentials::resolve(Some("lip_env".into()), "/nonexistent/secret.json").unwrap();
        assert_eq!(credentials.token(), "lip_env");
    }

    #[test]
    fn missing_or_broken_secret() {
        let err = Credentials::resolve(None, "/nonexistent/secret.json").unwrap_err();
        assert!(matches!(err, BridgeError::Credentials { .. }));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"OTHER": "x"}}"#).unwrap();
        let err = Credentials::resolve(Some(String::new()), file.path()).unwrap_err();
        assert!(matches!(err, BridgeError::Credentials { .. }));
    }
}
