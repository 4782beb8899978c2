//! Rolling per-predictor performance statistics
//!
//! Keyed by predictor id in a sharded map, so updates for one predictor
//! serialize against each other without any cross-key locking. Health is
//! re-derived from the rolling numbers on every read; a predictor is never
//! permanently disabled.

use crate::config::TrackerConfig;
use crate::models::PerformanceStat;
use dashmap::DashMap;

/// Mutable rolling state for one predictor
#[derive(Debug, Clone, Default)]
struct TrackedStat {
    sample_count: u64,
    avg_confidence: f32,
    avg_inference_time_ms: f32,
    consecutive_failures: u32,
}

/// Maintains rolling statistics across estimate calls
pub struct PerformanceTracker {
    stats: DashMap<String, TrackedStat>,
    config: TrackerConfig,
    /// Per-predictor call timeout, the reference point for latency health
    timeout_ms: u64,
}

impl PerformanceTracker {
    pub fn new(config: TrackerConfig, timeout_ms: u64) -> Self {
        Self {
            stats: DashMap::new(),
            config,
            timeout_ms,
        }
    }

    /// Record a completed call: bump the sample count, fold confidence and
    /// latency into the moving averages, reset the failure streak
    pub fn record_success(&self, predictor_id: &str, confidence: f32, inference_time_ms: u64) {
        let mut entry = self.stats.entry(predictor_id.to_string()).or_default();
        let alpha = self.config.ema_alpha;

        if entry.sample_count == 0 {
            entry.avg_confidence = confidence;
            entry.avg_inference_time_ms = inference_time_ms as f32;
        } else {
            entry.avg_confidence = alpha * confidence + (1.0 - alpha) * entry.avg_confidence;
            entry.avg_inference_time_ms =
                alpha * inference_time_ms as f32 + (1.0 - alpha) * entry.avg_inference_time_ms;
        }

        entry.sample_count += 1;
        entry.consecutive_failures = 0;
    }

    /// Record a failed or timed-out call. The elapsed time still feeds the
    /// latency average (a timeout charges the full bound) and confidence
    /// decays toward zero.
    pub fn record_failure(&self, predictor_id: &str, elapsed_ms: u64) {
        let mut entry = self.stats.entry(predictor_id.to_string()).or_default();
        let alpha = self.config.ema_alpha;

        if entry.sample_count == 0 {
            entry.avg_confidence = 0.0;
            entry.avg_inference_time_ms = elapsed_ms as f32;
        } else {
            entry.avg_confidence *= 1.0 - alpha;
            entry.avg_inference_time_ms =
                alpha * elapsed_ms as f32 + (1.0 - alpha) * entry.avg_inference_time_ms;
        }

        entry.sample_count += 1;
        entry.consecutive_failures += 1;
    }

    /// Whether a predictor currently counts as healthy. Unknown predictors
    /// are healthy until observed otherwise.
    pub fn is_healthy(&self, predictor_id: &str) -> bool {
        match self.stats.get(predictor_id) {
            Some(entry) => self.healthy(&entry),
            None => true,
        }
    }

    fn healthy(&self, stat: &TrackedStat) -> bool {
        let latency_bound = self.timeout_ms as f32 * self.config.unhealthy_latency_factor;
        stat.consecutive_failures < self.config.max_consecutive_failures
            && stat.avg_inference_time_ms < latency_bound
    }

    /// Current statistics for one predictor
    pub fn stat(&self, predictor_id: &str) -> Option<PerformanceStat> {
        self.stats.get(predictor_id).map(|entry| PerformanceStat {
            predictor_id: predictor_id.to_string(),
            sample_count: entry.sample_count,
            avg_confidence: entry.avg_confidence,
            avg_inference_time_ms: entry.avg_inference_time_ms,
            consecutive_failures: entry.consecutive_failures,
            is_healthy: self.healthy(&entry),
        })
    }

    /// Snapshot of every tracked predictor, sorted by id for determinism.
    /// The host may persist this and feed it back through `restore`.
    pub fn snapshot(&self) -> Vec<PerformanceStat> {
        let mut stats: Vec<PerformanceStat> = self
            .stats
            .iter()
            .map(|entry| PerformanceStat {
                predictor_id: entry.key().clone(),
                sample_count: entry.sample_count,
                avg_confidence: entry.avg_confidence,
                avg_inference_time_ms: entry.avg_inference_time_ms,
                consecutive_failures: entry.consecutive_failures,
                is_healthy: self.healthy(&entry),
            })
            .collect();
        stats.sort_by(|a, b| a.predictor_id.cmp(&b.predictor_id));
        stats
    }

    /// Snapshot serialized as JSON, the format the host persistence hook
    /// speaks
    pub fn snapshot_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Restore from a JSON snapshot previously produced by `snapshot_json`
    pub fn restore_json(&self, json: &str) -> anyhow::Result<()> {
        let stats: Vec<PerformanceStat> = serde_json::from_str(json)?;
        self.restore(stats);
        Ok(())
    }

    /// Seed the tracker from previously persisted statistics
    pub fn restore(&self, stats: Vec<PerformanceStat>) {
        for stat in stats {
            self.stats.insert(
                stat.predictor_id,
                TrackedStat {
                    sample_count: stat.sample_count,
                    avg_confidence: stat.avg_confidence,
                    avg_inference_time_ms: stat.avg_inference_time_ms,
                    consecutive_failures: stat.consecutive_failures,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PerformanceTracker {
        PerformanceTracker::new(TrackerConfig::default(), 2_000)
    }

    #[test]
    fn test_first_sample_seeds_averages() {
        let t = tracker();
        t.record_success("detector", 0.8, 120);

        let stat = t.stat("detector").unwrap();
        assert_eq!(stat.sample_count, 1);
        assert!((stat.avg_confidence - 0.8).abs() < 1e-6);
        assert!((stat.avg_inference_time_ms - 120.0).abs() < 1e-6);
        assert!(stat.is_healthy);
    }

    #[test]
    fn test_ema_moves_toward_new_values() {
        let t = tracker();
        t.record_success("detector", 0.8, 100);
        t.record_success("detector", 0.4, 200);

        let stat = t.stat("detector").unwrap();
        // alpha = 0.2: 0.2 * 0.4 + 0.8 * 0.8 = 0.72
        assert!((stat.avg_confidence - 0.72).abs() < 1e-4);
        assert!((stat.avg_inference_time_ms - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_three_failures_turn_unhealthy() {
        let t = tracker();
        t.record_success("depth", 0.7, 50);
        assert!(t.is_healthy("depth"));

        t.record_failure("depth", 50);
        t.record_failure("depth", 50);
        assert!(t.is_healthy("depth"));

        t.record_failure("depth", 50);
        assert!(!t.is_healthy("depth"));

        // One success resets the streak
        t.record_success("depth", 0.7, 50);
        assert!(t.is_healthy("depth"));
    }

    #[test]
    fn test_slow_average_latency_turns_unhealthy() {
        let t = tracker();
        // 2000ms timeout * 1.5 = 3000ms bound; seed above it
        t.record_failure("onnx", 3_500);
        assert!(!t.is_healthy("onnx"));
    }

    #[test]
    fn test_unknown_predictor_is_healthy() {
        assert!(tracker().is_healthy("never-seen"));
    }

    #[test]
    fn test_json_round_trip() {
        let t = tracker();
        t.record_success("detector", 0.8, 100);

        let json = t.snapshot_json().unwrap();
        let restored = tracker();
        restored.restore_json(&json).unwrap();
        assert_eq!(restored.snapshot(), t.snapshot());
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let t = tracker();
        t.record_success("detector", 0.8, 100);
        t.record_failure("depth", 2_000);

        let snapshot = t.snapshot();
        assert_eq!(snapshot.len(), 2);
        // Sorted by id
        assert_eq!(snapshot[0].predictor_id, "depth");
        assert_eq!(snapshot[1].predictor_id, "detector");

        let restored = tracker();
        restored.restore(snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot);
    }
}
