use serde::{Deserialize, Serialize};

use crate::event::DispatchOutcome;

/// Dispatch counters
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Metrics {
    pub dispatched_total: u64,
    pub dispatched_ok: u64,
    pub dispatched_miss: u64,
    pub dispatched_failed: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished dispatch
    pub fn record(&mut self, outcome: &DispatchOutcome) {
        self.dispatched_total += 1;
        match outcome {
            DispatchOutcome::Ok => self.dispatched_ok += 1,
            DispatchOutcome::Miss => self.dispatched_miss += 1,
            DispatchOutcome::Failed { .. } => self.dispatched_failed += 1,
        }
    }

    /// Share of handled (non-miss) dispatches that succeeded, as percentage
    pub fn success_rate(&self) -> f64 {
        let handled = self.dispatched_ok + self.dispatched_failed;
        if handled == 0 {
            return 100.0;
        }
        (self.dispatched_ok as f64 / handled as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.dispatched_total, 0);
        assert_eq!(metrics, Metrics::default());
    }

    #[test]
    fn test_record_mixed() {
        let mut metrics = Metrics::new();
        metrics.record(&DispatchOutcome::Ok);
        metrics.record(&DispatchOutcome::Ok);
        metrics.record(&DispatchOutcome::Miss);
        metrics.record(&DispatchOutcome::Failed { cause: "x".into() });

        assert_eq!(metrics.dispatched_total, 4);
        assert_eq!(metrics.dispatched_ok, 2);
        assert_eq!(metrics.dispatched_miss, 1);
        assert_eq!(metrics.dispatched_failed, 1);
    }

    #[test]
    fn test_success_rate_zero_dispatches() {
        assert_eq!(Metrics::new().success_rate(), 100.0);
    }

    #[test]
    fn test_success_rate_ignores_misses() {
        let mut metrics = Metrics::new();
        metrics.record(&DispatchOutcome::Ok);
        metrics.record(&DispatchOutcome::Miss);
        metrics.record(&DispatchOutcome::Failed { cause: "x".into() });
        assert_eq!(metrics.success_rate(), 50.0);
    }

    #[test]
    fn test_metrics_serialize() {
        let mut metrics = Metrics::new();
        metrics.record(&DispatchOutcome::Ok);
        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains("\"dispatched_ok\":1"));
    }
}
