//! Risk score computation over the violation ledger.
//!
//! The score is recomputed from scratch on every ingestion and heartbeat.
//! Only violations inside the trailing window contribute, so old violations
//! decay out of the score without any incremental state.

use crate::core::violation::ViolationEvent;
use chrono::{DateTime, Utc};

/// Length of the trailing window in milliseconds (5 minutes).
pub const RISK_WINDOW_MS: i64 = 300_000;

/// More windowed violations than this triggers the frequency multiplier.
const FREQUENCY_THRESHOLD: usize = 5;

/// Multiplier applied when the frequency threshold is exceeded.
const FREQUENCY_MULTIPLIER: f64 = 1.5;

/// Upper bound of the score.
pub const MAX_RISK_SCORE: f64 = 100.0;

/// Whether a violation falls inside the trailing window ending at `now`.
///
/// Future-dated violations are outside the window.
pub fn in_window(violation: &ViolationEvent, now: DateTime<Utc>) -> bool {
    let age_ms = (now - violation.timestamp).num_milliseconds();
    (0..RISK_WINDOW_MS).contains(&age_ms)
}

/// Compute the risk score at `now` for the given ledger.
///
/// Sum of severity weights over the windowed violations, multiplied by 1.5
/// when more than five are windowed, clamped to `[0, 100]`.
pub fn compute_risk_score(violations: &[ViolationEvent], now: DateTime<Utc>) -> f64 {
    let windowed: Vec<&ViolationEvent> = violations.iter().filter(|v| in_window(v, now)).collect();

    let mut score: f64 = windowed.iter().map(|v| v.severity.weight()).sum();
    if windowed.len() > FREQUENCY_THRESHOLD {
        score *= FREQUENCY_MULTIPLIER;
    }

    score.clamp(0.0, MAX_RISK_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::violation::{Severity, ViolationType};
    use chrono::Duration;

    fn violation_at(now: DateTime<Utc>, age_ms: i64, severity: Severity) -> ViolationEvent {
        ViolationEvent::new(
            ViolationType::WindowBlur,
            severity,
            "test",
            now - Duration::milliseconds(age_ms),
        )
    }

    #[test]
    fn test_empty_ledger_scores_zero() {
        assert_eq!(compute_risk_score(&[], Utc::now()), 0.0);
    }

    #[test]
    fn test_window_edge() {
        let now = Utc::now();
        let outside = vec![violation_at(now, 300_001, Severity::High)];
        let inside = vec![violation_at(now, 299_999, Severity::High)];

        assert_eq!(compute_risk_score(&outside, now), 0.0);
        assert_eq!(compute_risk_score(&inside, now), 50.0);
    }

    #[test]
    fn test_single_high_has_no_multiplier() {
        let now = Utc::now();
        let ledger = vec![violation_at(now, 0, Severity::High)];
        assert_eq!(compute_risk_score(&ledger, now), 50.0);
    }

    #[test]
    fn test_six_low_violations_get_multiplier() {
        let now = Utc::now();
        let ledger: Vec<_> = (0..6)
            .map(|i| violation_at(now, i * 1_000, Severity::Low))
            .collect();
        assert_eq!(compute_risk_score(&ledger, now), 90.0);
    }

    #[test]
    fn test_five_medium_violations_no_multiplier() {
        let now = Utc::now();
        let ledger: Vec<_> = (0..5)
            .map(|i| violation_at(now, i * 1_000, Severity::Medium))
            .collect();
        assert_eq!(compute_risk_score(&ledger, now), 100.0);

        let ledger: Vec<_> = (0..3)
            .map(|i| violation_at(now, i * 1_000, Severity::Medium))
            .collect();
        assert_eq!(compute_risk_score(&ledger, now), 75.0);
    }

    #[test]
    fn test_score_is_clamped() {
        let now = Utc::now();
        let ledger: Vec<_> = (0..20)
            .map(|i| violation_at(now, i * 1_000, Severity::High))
            .collect();
        assert_eq!(compute_risk_score(&ledger, now), MAX_RISK_SCORE);
    }

    #[test]
    fn test_only_windowed_violations_count_toward_multiplier() {
        let now = Utc::now();
        let mut ledger: Vec<_> = (0..5)
            .map(|i| violation_at(now, 400_000 + i * 1_000, Severity::Low))
            .collect();
        ledger.push(violation_at(now, 10, Severity::Low));
        assert_eq!(compute_risk_score(&ledger, now), 10.0);
    }

    #[test]
    fn test_future_violations_are_ignored() {
        let now = Utc::now();
        let ledger = vec![violation_at(now, -5_000, Severity::High)];
        assert_eq!(compute_risk_score(&ledger, now), 0.0);
    }

    #[test]
    fn test_recomputation_is_deterministic() {
        let now = Utc::now();
        let ledger: Vec<_> = (0..8)
            .map(|i| violation_at(now, i * 40_000, Severity::Medium))
            .collect();
        let first = compute_risk_score(&ledger, now);
        let second = compute_risk_score(&ledger, now);
        assert_eq!(first, second);
    }
}
