//! Violation events recorded during a monitored session.
//!
//! A violation is immutable once created. The manager appends it to the
//! session ledger and never touches it again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of deviation that was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    FaceNotDetected,
    MultipleFaces,
    TabSwitch,
    WindowBlur,
    CopyPaste,
    RightClick,
    SuspiciousMovement,
    AudioDetected,
    ScreenShareStopped,
}

impl ViolationType {
    /// Stable snake_case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::FaceNotDetected => "face_not_detected",
            ViolationType::MultipleFaces => "multiple_faces",
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::WindowBlur => "window_blur",
            ViolationType::CopyPaste => "copy_paste",
            ViolationType::RightClick => "right_click",
            ViolationType::SuspiciousMovement => "suspicious_movement",
            ViolationType::AudioDetected => "audio_detected",
            ViolationType::ScreenShareStopped => "screen_share_stopped",
        }
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Contribution of one violation of this severity to the risk score.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 10.0,
            Severity::Medium => 25.0,
            Severity::High => 50.0,
        }
    }
}

/// A single detected deviation from expected exam-taking behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Unique id, lets a host de-duplicate persisted evidence
    pub id: Uuid,
    /// What was detected
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    /// When the sensor observed it
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Human-readable explanation for reviewers
    pub description: String,
    /// Optional sensor-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ViolationEvent {
    pub fn new(
        violation_type: ViolationType,
        severity: Severity,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            violation_type,
            timestamp,
            severity,
            description: description.into(),
            data: None,
        }
    }

    /// Attach a sensor-specific payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_form_uses_snake_case() {
        let event = ViolationEvent::new(
            ViolationType::TabSwitch,
            Severity::High,
            "Tab switch detected",
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tab_switch");
        assert_eq!(json["severity"], "high");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_severity_weights_are_monotone() {
        assert!(Severity::Low.weight() < Severity::Medium.weight());
        assert!(Severity::Medium.weight() < Severity::High.weight());
        assert!(Severity::Low < Severity::High);
    }

    #[test]
    fn test_display_matches_serde_name() {
        let json = serde_json::to_string(&ViolationType::ScreenShareStopped).unwrap();
        assert_eq!(json, format!("\"{}\"", ViolationType::ScreenShareStopped));
    }
}
