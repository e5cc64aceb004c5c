//! Runtime configuration for the engine and its transport.

use shared::{
    CONNECTION_IDLE_TIMEOUT_SECS, ENTITY_TIMEOUT_SECS, MAX_COURT_SPAWN_X,
    MAX_ROOM_CODE_ATTEMPTS, MIN_COURT_SPAWN_X, SWEEP_INTERVAL_SECS,
};
use std::str::FromStr;
use std::time::Duration;

/// How inbound `Type` strings are matched against the known tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMatching {
    #[default]
    Exact,
    /// Old clients send decorated tags such as `BallStateMessage`.
    Substring,
}

impl FromStr for TagMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(TagMatching::Exact),
            "substring" | "legacy" => Ok(TagMatching::Substring),
            other => Err(format!("unknown tag matching mode '{other}'")),
        }
    }
}

/// How a game's ball update is validated against concurrent submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BallCommit {
    /// Validate and commit under the game's lock.
    #[default]
    Serialized,
    /// Validate against a snapshot, then commit; concurrent touches may both pass
    /// and the later write wins.
    LastWriterWins,
}

impl FromStr for BallCommit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "serialized" => Ok(BallCommit::Serialized),
            "last-writer-wins" | "lww" => Ok(BallCommit::LastWriterWins),
            other => Err(format!("unknown ball commit mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Idle time after which a game or lobby is evicted.
    pub entity_timeout: Duration,
    /// How often each game/lobby watcher checks its entity.
    pub sweep_interval: Duration,
    /// Idle time after which a connection is closed.
    pub connection_idle_timeout: Duration,
    pub room_code_attempts: usize,
    pub spawn_min_x: f32,
    pub spawn_max_x: f32,
    /// Fixed seed for room codes and spawn positions; entropy when `None`.
    pub rng_seed: Option<u64>,
    pub tag_matching: TagMatching,
    pub ball_commit: BallCommit,
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:13274".to_string(),
            entity_timeout: Duration::from_secs(ENTITY_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            connection_idle_timeout: Duration::from_secs(CONNECTION_IDLE_TIMEOUT_SECS),
            room_code_attempts: MAX_ROOM_CODE_ATTEMPTS,
            spawn_min_x: MIN_COURT_SPAWN_X,
            spawn_max_x: MAX_COURT_SPAWN_X,
            rng_seed: None,
            tag_matching: TagMatching::Exact,
            ball_commit: BallCommit::Serialized,
            stats_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Config used by tests: deterministic randomness, default timings.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        // x = 0 counts as the left side, so both bounds must stay off the net
        if self.spawn_min_x <= 0.0 || self.spawn_max_x < self.spawn_min_x {
            return Err(format!(
                "invalid spawn bounds [{}, {}]",
                self.spawn_min_x, self.spawn_max_x
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err("sweep interval must be positive".to_string());
        }
        if self.connection_idle_timeout.is_zero() {
            return Err("connection idle timeout must be positive".to_string());
        }
        if self.room_code_attempts == 0 {
            return Err("room code attempts must be positive".to_string());
        }
        Ok(())
    }
}
