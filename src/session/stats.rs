//! Per-session statistics

use crate::outcome::OutcomeStatus;
use std::time::Instant;

/// Counters tracked by each dispatch session
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Requests accepted by the receiver
    pub ok: usize,

    /// Requests authoritatively rejected
    pub rejected: usize,

    /// Requests that exhausted the retry schedule
    pub timeouts: usize,

    /// Requests abandoned on channel failure or cancellation
    pub abandoned: usize,

    /// Session start time
    pub started_at: Option<Instant>,

    /// Session end time
    pub ended_at: Option<Instant>,
}

impl SessionStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the session start time
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Record the session end time
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Record one concluded request
    pub fn record(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Ok => self.ok += 1,
            OutcomeStatus::Error => self.rejected += 1,
            OutcomeStatus::Timeout => self.timeouts += 1,
            OutcomeStatus::Abandoned => self.abandoned += 1,
        }
    }

    /// Total requests accounted for
    pub fn total(&self) -> usize {
        self.ok + self.rejected + self.timeouts + self.abandoned
    }

    /// Elapsed time since start
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record() {
        let mut stats = SessionStats::new();
        stats.record(OutcomeStatus::Ok);
        stats.record(OutcomeStatus::Ok);
        stats.record(OutcomeStatus::Error);
        stats.record(OutcomeStatus::Timeout);
        stats.record(OutcomeStatus::Abandoned);

        assert_eq!(stats.ok, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn test_stats_elapsed() {
        let mut stats = SessionStats::new();
        assert!(stats.elapsed().is_none());

        stats.start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        stats.stop();

        assert!(stats.elapsed().unwrap() >= std::time::Duration::from_millis(5));
    }
}
