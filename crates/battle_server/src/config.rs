//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use battle_core::config::BattleConfig;
use battle_core::error::{BattleError, Result};
use serde::{Deserialize, Serialize};

use crate::reaper::ReaperPolicy;

/// Default reaper period (five minutes).
pub const DEFAULT_REAPER_PERIOD_SECS: u64 = 300;

/// Default time without heartbeat or connection before a session is
/// considered orphaned (two minutes).
pub const DEFAULT_LIVENESS_TIMEOUT_SECS: u64 = 120;

/// Default wall-clock bound on an active session (fifteen minutes).
pub const DEFAULT_MAX_SESSION_AGE_SECS: u64 = 900;

/// Default time a finished, persisted session stays readable (ten minutes).
pub const DEFAULT_RETENTION_SECS: u64 = 600;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Rules every new session runs under.
    pub battle: BattleConfig,
    /// Seconds between reaper sweeps.
    pub reaper_period_secs: u64,
    /// Seconds of client silence before an active session is abandoned.
    pub liveness_timeout_secs: u64,
    /// Seconds after which an active session is abandoned regardless.
    pub max_session_age_secs: u64,
    /// Seconds a finished session stays in the store after persisting.
    pub retention_secs: u64,
    /// Troop catalog file; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            battle: BattleConfig::default(),
            reaper_period_secs: DEFAULT_REAPER_PERIOD_SECS,
            liveness_timeout_secs: DEFAULT_LIVENESS_TIMEOUT_SECS,
            max_session_age_secs: DEFAULT_MAX_SESSION_AGE_SECS,
            retention_secs: DEFAULT_RETENTION_SECS,
            catalog_path: None,
        }
    }
}

impl ServerConfig {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.battle.validate()?;
        if self.reaper_period_secs == 0 {
            return Err(BattleError::InvalidState(
                "reaper_period_secs must be positive".into(),
            ));
        }
        if self.liveness_timeout_secs == 0 {
            return Err(BattleError::InvalidState(
                "liveness_timeout_secs must be positive".into(),
            ));
        }
        if self.max_session_age_secs.saturating_mul(1_000) < self.battle.max_duration_ms {
            return Err(BattleError::InvalidState(
                "max_session_age_secs is shorter than the maximum battle duration".into(),
            ));
        }
        Ok(())
    }

    /// Parse from RON text. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] on malformed RON, or the
    /// validation error.
    pub fn from_ron(text: &str, source: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| BattleError::DataParseError {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] if the file cannot be read or
    /// parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BattleError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron(&text, &path.display().to_string())
    }

    /// Wall-clock interval between ticks.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.battle.tick_ms))
    }

    /// Interval between reaper sweeps.
    #[must_use]
    pub const fn reaper_period(&self) -> Duration {
        Duration::from_secs(self.reaper_period_secs)
    }

    /// Reaper thresholds.
    #[must_use]
    pub const fn reaper_policy(&self) -> ReaperPolicy {
        ReaperPolicy {
            liveness_timeout: Duration::from_secs(self.liveness_timeout_secs),
            max_session_age: Duration::from_secs(self.max_session_age_secs),
            retention: Duration::from_secs(self.retention_secs),
        }
    }
}
