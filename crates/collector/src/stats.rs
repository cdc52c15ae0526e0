//! Process-lifetime collection counters.

use chrono::{DateTime, Utc};

/// Orchestrator-wide counters, mutated once per round by the collection
/// loop and read by the health-check loop.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    /// Exchanges collected successfully, accumulated across rounds.
    pub collections_completed: u64,
    /// Exchanges with zero successful sub-collections, accumulated.
    pub collections_failed: u64,
    /// End of the most recent round.
    pub last_collection_time: Option<DateTime<Utc>>,
    /// When the orchestrator entered the running state.
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds since start, as of the most recent round.
    pub total_runtime_secs: f64,
}

impl CollectionStats {
    /// Records the start of the collection service.
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.start_time = Some(now);
    }

    /// Folds one round's outcome into the counters.
    pub fn record_round(&mut self, successful: u64, failed: u64, now: DateTime<Utc>) {
        self.collections_completed += successful;
        self.collections_failed += failed;
        self.last_collection_time = Some(now);
        if let Some(start) = self.start_time {
            self.total_runtime_secs = (now - start).num_milliseconds() as f64 / 1000.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn record_round_accumulates_counters() {
        let mut stats = CollectionStats::default();
        let start = Utc::now();
        stats.mark_started(start);

        stats.record_round(2, 0, start + Duration::seconds(10));
        stats.record_round(1, 1, start + Duration::seconds(20));

        assert_eq!(stats.collections_completed, 3);
        assert_eq!(stats.collections_failed, 1);
        assert!((stats.total_runtime_secs - 20.0).abs() < 0.001);
        assert!(stats.last_collection_time.is_some());
    }

    #[test]
    fn runtime_stays_zero_without_start_time() {
        let mut stats = CollectionStats::default();
        stats.record_round(1, 0, Utc::now());

        assert!(stats.total_runtime_secs.abs() < f64::EPSILON);
    }
}
