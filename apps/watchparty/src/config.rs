use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read tuning file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse tuning file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid tuning: {0}")]
    Invalid(String),
}

/// Every knob of the synchronization engine in one place.
///
/// Defaults are the reference values the engine was tuned against; a TOML
/// file may override any subset of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncTuning {
    /// Period of the follower drift correction loop.
    pub sync_loop_ms: u64,
    /// Period of clock probes (`ping`), independent of room membership.
    pub probe_interval_ms: u64,
    /// Period of the host heartbeat `state_update`.
    pub heartbeat_ms: u64,
    /// Echo suppression window refreshed by every locally-applied remote command.
    pub suppress_ms: u64,
    /// Minimum gap before a discrete event forces a seek; also the smallest
    /// host seek that gets broadcast.
    pub seek_threshold_secs: f64,
    /// Minimum spacing between two host seek reports.
    pub seek_report_min_interval_ms: u64,
    /// Lead added to `play` / `room_state` targets to cover processing and
    /// initial buffering on the follower.
    pub sync_lead_ms: u64,
    pub drift_deadzone_secs: f64,
    pub drift_soft_max_secs: f64,
    pub drift_gain: f64,
    pub rate_min: f64,
    pub rate_max: f64,
    /// Cooldown after applying a host `play` or a local resume.
    pub resume_cooldown_ms: u64,
    /// Position overwrite suppression at the start of the initial catch-up.
    pub initial_settle_ms: u64,
    /// Hard upper bound on the initial catch-up phase.
    pub initial_max_ms: u64,
    /// Drift under which the initial catch-up is considered done.
    pub initial_exit_drift_secs: f64,
    /// Drift over which the initial catch-up seeks instead of chasing.
    pub initial_max_drift_secs: f64,
    pub reconnect_base_ms: u64,
    pub reconnect_factor: u32,
    pub reconnect_max_ms: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            sync_loop_ms: 500,
            probe_interval_ms: 10_000,
            heartbeat_ms: 1_000,
            suppress_ms: 2_000,
            seek_threshold_secs: 1.0,
            seek_report_min_interval_ms: 250,
            sync_lead_ms: 300,
            drift_deadzone_secs: 0.04,
            drift_soft_max_secs: 2.0,
            drift_gain: 0.50,
            rate_min: 0.85,
            rate_max: 2.0,
            resume_cooldown_ms: 2_000,
            initial_settle_ms: 8_000,
            initial_max_ms: 30_000,
            initial_exit_drift_secs: 0.5,
            initial_max_drift_secs: 10.0,
            reconnect_base_ms: 1_000,
            reconnect_factor: 2,
            reconnect_max_ms: 30_000,
        }
    }
}

impl SyncTuning {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let tuning: SyncTuning = toml::from_str(raw)?;
        tuning.validate()?;
        Ok(tuning)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("sync_loop_ms", self.sync_loop_ms),
            ("probe_interval_ms", self.probe_interval_ms),
            ("heartbeat_ms", self.heartbeat_ms),
            ("reconnect_base_ms", self.reconnect_base_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if !(self.rate_min > 0.0 && self.rate_min <= 1.0 && self.rate_max >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "rate bounds must straddle 1.0 (got {}..{})",
                self.rate_min, self.rate_max
            )));
        }
        if self.drift_deadzone_secs < 0.0 || self.drift_deadzone_secs >= self.drift_soft_max_secs
        {
            return Err(ConfigError::Invalid(
                "drift_deadzone_secs must be below drift_soft_max_secs".into(),
            ));
        }
        if self.initial_exit_drift_secs >= self.initial_max_drift_secs {
            return Err(ConfigError::Invalid(
                "initial_exit_drift_secs must be below initial_max_drift_secs".into(),
            ));
        }
        if self.reconnect_factor == 0 || self.reconnect_max_ms < self.reconnect_base_ms {
            return Err(ConfigError::Invalid("invalid reconnect backoff".into()));
        }
        Ok(())
    }

    pub fn sync_loop_period(&self) -> Duration {
        Duration::from_millis(self.sync_loop_ms)
    }

    pub fn probe_period(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn sync_lead_secs(&self) -> f64 {
        self.sync_lead_ms as f64 / 1000.0
    }
}

/// Which side of the room this process plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRole {
    /// Create the room and report local playback.
    Host { media_id: Option<String> },
    /// Join an existing room and follow its host.
    Follow { room: String },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relay_url: String,
    pub user_name: String,
    pub role: RoomRole,
}

impl RelayConfig {
    pub fn new(relay_url: impl Into<String>, user_name: impl Into<String>, role: RoomRole) -> Self {
        let relay_url = relay_url.into();
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference
        let relay_url = if relay_url.contains("://localhost") {
            relay_url.replacen("://localhost", "://127.0.0.1", 1)
        } else {
            relay_url
        };
        Self {
            relay_url,
            user_name: user_name.into(),
            role,
        }
    }
}
