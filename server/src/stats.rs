//! Server vitals, reported periodically through the log.

use crate::utils::{format_bytes, get_timestamp};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct ServerStats {
    started_at_ms: u64,
    requests: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Point-in-time copy of the counters plus registry sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub started_at_ms: u64,
    pub requests: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub lobbies: usize,
    pub games: usize,
    pub players: usize,
    pub connections: usize,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started_at_ms: get_timestamp(),
            requests: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self, bytes: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "up since {} ms | requests: {} | lobbies: {} | games: {} | players: {} | connections: {} | received: {} | sent: {}",
            self.started_at_ms,
            self.requests,
            self.lobbies,
            self.games,
            self.players,
            self.connections,
            format_bytes(self.bytes_received),
            format_bytes(self.bytes_sent),
        )
    }
}
