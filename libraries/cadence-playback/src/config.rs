//! Player configuration
//!
//! `PlayerConfig::load` reads an optional TOML file, then environment
//! variables prefixed with `CADENCE__`, and falls back to struct defaults for
//! anything left unset.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for the dispatcher, transport engine and persistence adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Progress tick period while playing (default: 250)
    pub progress_interval_ms: u64,

    /// Minimum distance between two persisted bookmarks (default: 5000)
    pub bookmark_save_interval_ms: u64,

    /// Backward offset applied to a restored bookmark (default: 5000)
    pub resume_rewind_ms: u64,

    /// Past this position `previous` restarts the current track (default: 5000)
    pub restart_threshold_ms: u64,

    /// Volume floor while ducked, 0.0-1.0 (default: 0.2)
    pub duck_volume: f32,

    /// Volume decrement per fade-out step (default: 0.05)
    pub fade_out_step: f32,

    /// Volume increment per fade-in step (default: 0.3)
    pub fade_in_step: f32,

    /// Delay between fade steps (default: 10)
    pub fade_step_delay_ms: u64,

    /// Upper bound for the wake lease held across a track boundary (default: 30000)
    pub wake_lease_timeout_ms: u64,

    /// Key of the snapshot record in the durable store
    pub snapshot_key: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 250,
            bookmark_save_interval_ms: 5_000,
            resume_rewind_ms: 5_000,
            restart_threshold_ms: 5_000,
            duck_volume: 0.2,
            fade_out_step: 0.05,
            fade_in_step: 0.3,
            fade_step_delay_ms: 10,
            wake_lease_timeout_ms: 30_000,
            snapshot_key: "cadence.playback.snapshot".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Load from `CADENCE_CONFIG_PATH` (or the XDG default) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(resolve_config_path().as_deref())
    }

    /// Load from an explicit optional file plus the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("CADENCE")
                .separator("__")
                .try_parsing(true),
        );

        let config: PlayerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            return Err(invalid("progress_interval_ms must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.duck_volume) {
            return Err(invalid("duck_volume must be within 0.0..=1.0"));
        }
        if self.fade_out_step <= 0.0 || self.fade_in_step <= 0.0 {
            return Err(invalid("fade steps must be > 0.0"));
        }
        if self.snapshot_key.is_empty() {
            return Err(invalid("snapshot_key must not be empty"));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn fade_step_delay(&self) -> Duration {
        Duration::from_millis(self.fade_step_delay_ms)
    }

    pub fn wake_lease_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_lease_timeout_ms)
    }
}

fn invalid(message: &str) -> PlaybackError {
    PlaybackError::InvalidOperation(format!("invalid configuration: {message}"))
}

/// Resolve the config path from `CADENCE_CONFIG_PATH` or XDG defaults
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os("CADENCE_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }
    default_config_path()
}

/// `$XDG_CONFIG_HOME/cadence/config.toml`, or `~/.config/cadence/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|dir| dir.join("cadence").join("config.toml"))
}
