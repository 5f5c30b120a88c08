//! Session state, summaries and evidence export.

use crate::core::risk::compute_risk_score;
use crate::core::violation::{Severity, ViolationEvent, ViolationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle phase of a proctoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Initializing,
    Initialized,
    Active,
    Stopped,
}

/// Guard on `stop()`. Only the host can move it to `Unlockable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopLatch {
    #[default]
    Locked,
    Unlockable,
}

/// The single live state of a session, owned by the manager.
///
/// Observers only ever see clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctoringState {
    pub session_id: Uuid,
    pub phase: Phase,
    pub is_active: bool,
    pub is_initialized: bool,
    pub has_webcam: bool,
    pub has_microphone: bool,
    /// Append-only, in ingestion order
    pub violations: Vec<ViolationEvent>,
    pub risk_score: f64,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ProctoringState {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            phase: Phase::Uninitialized,
            is_active: false,
            is_initialized: false,
            has_webcam: false,
            has_microphone: false,
            violations: Vec::new(),
            risk_score: 0.0,
            last_heartbeat: None,
        }
    }
}

impl Default for ProctoringState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl SeverityBreakdown {
    fn count(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
        }
    }
}

/// Derived view of the ledger for graders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub total_violations: usize,
    pub violations_by_type: BTreeMap<ViolationType, usize>,
    pub severity_breakdown: SeverityBreakdown,
    pub final_risk_score: f64,
    /// Whether the score reached the configured suspicious-activity threshold
    pub flagged: bool,
    /// Milliseconds since the last heartbeat while active, 0 otherwise.
    ///
    /// Questionable: this is not the elapsed session time, it is bounded by
    /// the heartbeat period. Kept as computed until product confirms the
    /// intended meaning.
    pub session_duration_ms: i64,
}

impl SessionSummary {
    /// Summarize `state` as of `now`. Pure read.
    pub fn from_state(state: &ProctoringState, threshold: u32, now: DateTime<Utc>) -> Self {
        let session_duration_ms = match (state.is_active, state.last_heartbeat) {
            (true, Some(heartbeat)) => (now - heartbeat).num_milliseconds().max(0),
            _ => 0,
        };
        Self::from_ledger(
            state.session_id,
            &state.violations,
            state.risk_score,
            threshold,
            session_duration_ms,
        )
    }

    /// Summarize a bare ledger, scoring it at the time of its latest entry.
    pub fn for_exported_ledger(
        session_id: Uuid,
        violations: &[ViolationEvent],
        threshold: u32,
    ) -> Self {
        let risk = violations
            .iter()
            .map(|v| v.timestamp)
            .max()
            .map(|latest| compute_risk_score(violations, latest))
            .unwrap_or(0.0);
        Self::from_ledger(session_id, violations, risk, threshold, 0)
    }

    fn from_ledger(
        session_id: Uuid,
        violations: &[ViolationEvent],
        risk_score: f64,
        threshold: u32,
        session_duration_ms: i64,
    ) -> Self {
        let mut violations_by_type = BTreeMap::new();
        let mut severity_breakdown = SeverityBreakdown::default();
        for v in violations {
            *violations_by_type.entry(v.violation_type).or_insert(0) += 1;
            severity_breakdown.count(v.severity);
        }
        Self {
            session_id,
            total_violations: violations.len(),
            violations_by_type,
            severity_breakdown,
            final_risk_score: risk_score,
            flagged: risk_score >= threshold as f64,
            session_duration_ms,
        }
    }
}

/// Result of the pre-exam environment scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentScanResult {
    pub success: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// The evidence trail handed to the host for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceExport {
    pub session_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub summary: SessionSummary,
    pub violations: Vec<ViolationEvent>,
}

impl EvidenceExport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn violation(kind: ViolationType, severity: Severity, at: DateTime<Utc>) -> ViolationEvent {
        ViolationEvent::new(kind, severity, "test", at)
    }

    #[test]
    fn test_summary_counts_by_type_and_severity() {
        let now = Utc::now();
        let mut state = ProctoringState::new();
        state.violations = vec![
            violation(ViolationType::TabSwitch, Severity::Medium, now),
            violation(ViolationType::TabSwitch, Severity::High, now),
            violation(ViolationType::RightClick, Severity::Low, now),
        ];
        state.risk_score = 85.0;

        let summary = SessionSummary::from_state(&state, 70, now);
        assert_eq!(summary.total_violations, 3);
        assert_eq!(summary.violations_by_type[&ViolationType::TabSwitch], 2);
        assert_eq!(
            summary.severity_breakdown,
            SeverityBreakdown {
                low: 1,
                medium: 1,
                high: 1
            }
        );
        assert_eq!(summary.final_risk_score, 85.0);
        assert!(summary.flagged);
    }

    #[test]
    fn test_session_duration_is_time_since_heartbeat() {
        let now = Utc::now();
        let mut state = ProctoringState::new();
        state.last_heartbeat = Some(now - Duration::milliseconds(1_200));

        assert_eq!(SessionSummary::from_state(&state, 70, now).session_duration_ms, 0);

        state.is_active = true;
        assert_eq!(
            SessionSummary::from_state(&state, 70, now).session_duration_ms,
            1_200
        );
    }

    #[test]
    fn test_exported_ledger_scored_at_latest_entry() {
        let start = Utc::now() - Duration::days(1);
        let ledger = vec![
            violation(ViolationType::WindowBlur, Severity::Medium, start),
            violation(ViolationType::TabSwitch, Severity::High, start + Duration::seconds(30)),
        ];
        let summary = SessionSummary::for_exported_ledger(Uuid::nil(), &ledger, 70);
        assert_eq!(summary.final_risk_score, 75.0);
        assert!(summary.flagged);

        let empty = SessionSummary::for_exported_ledger(Uuid::nil(), &[], 70);
        assert_eq!(empty.final_risk_score, 0.0);
        assert!(!empty.flagged);
    }
}
