//! Process-wide relay counters, reported by the health endpoint

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RelayStats {
    connections_accepted: AtomicU64,
    connections_closed: AtomicU64,
    frames_relayed: AtomicU64,
    frames_discarded: AtomicU64,
    presence_updates: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub connections_closed: u64,
    pub frames_relayed: u64,
    pub frames_discarded: u64,
    pub presence_updates: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_relayed(&self) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_discarded(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn presence_sent(&self, recipients: usize) {
        self.presence_updates
            .fetch_add(recipients as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            presence_updates: self.presence_updates.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = RelayStats::new();
        stats.connection_accepted();
        stats.connection_accepted();
        stats.connection_closed();
        stats.frame_relayed();
        stats.frame_discarded();
        stats.presence_sent(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 2);
        assert_eq!(snapshot.connections_closed, 1);
        assert_eq!(snapshot.frames_relayed, 1);
        assert_eq!(snapshot.frames_discarded, 1);
        assert_eq!(snapshot.presence_updates, 3);
    }
}
