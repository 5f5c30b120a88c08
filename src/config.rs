//! Configuration for a proctored session.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Immutable per-session proctoring configuration.
///
/// Every field has a default so a host can supply a partial JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctoringConfig {
    /// Run the presence detector on the camera stream
    pub face_detection: bool,
    /// Host-side screen recording (carried for the host, not acted on here)
    pub screen_recording: bool,
    /// Enable the lockdown controller
    pub browser_lockdown: bool,
    /// Report clipboard use
    pub prevent_copy_paste: bool,
    /// Report context-menu use
    pub prevent_right_click: bool,
    /// Lockdown treats leaving fullscreen as a lost restriction
    pub prevent_tab_switch: bool,
    /// Initialization fails without a video-input device
    pub webcam_required: bool,
    /// Run audio-level analysis on the microphone track
    pub microphone_monitoring: bool,
    /// Host intends to run the environment scan before starting
    pub environment_scan: bool,
    /// Host intends to run ID verification (needs the webcam)
    pub id_verification: bool,
    /// Tab switches tolerated before escalating to high severity
    pub allowed_tab_switches: u32,
    /// Risk score at which the host should flag the attempt (0-100)
    pub suspicious_activity_threshold: u32,
    /// Treat a face model load failure as fatal instead of falling back
    pub strict_face_model: bool,
    /// Timer periods and timeouts
    pub timings: SensorTimings,
}

impl Default for ProctoringConfig {
    fn default() -> Self {
        Self {
            face_detection: true,
            screen_recording: false,
            browser_lockdown: true,
            prevent_copy_paste: true,
            prevent_right_click: true,
            prevent_tab_switch: true,
            webcam_required: true,
            microphone_monitoring: false,
            environment_scan: false,
            id_verification: false,
            allowed_tab_switches: 3,
            suspicious_activity_threshold: 70,
            strict_face_model: false,
            timings: SensorTimings::default(),
        }
    }
}

/// Periods of the recurring sensor timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorTimings {
    #[serde(with = "millis_serde")]
    pub presence_interval: Duration,
    #[serde(with = "millis_serde")]
    pub audio_interval: Duration,
    #[serde(with = "millis_serde")]
    pub performance_interval: Duration,
    #[serde(with = "millis_serde")]
    pub heartbeat_interval: Duration,
    /// How long to wait for the camera stream to deliver metadata
    #[serde(with = "millis_serde")]
    pub stream_ready_timeout: Duration,
}

impl Default for SensorTimings {
    fn default() -> Self {
        Self {
            presence_interval: Duration::from_millis(1_000),
            audio_interval: Duration::from_millis(1_000),
            performance_interval: Duration::from_millis(5_000),
            heartbeat_interval: Duration::from_millis(5_000),
            stream_ready_timeout: Duration::from_millis(10_000),
        }
    }
}

impl ProctoringConfig {
    /// Whether a camera stream should be acquired at all.
    pub fn needs_camera(&self) -> bool {
        self.webcam_required || self.face_detection
    }

    /// Reject configurations that can never be satisfied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suspicious_activity_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "suspicious_activity_threshold must be within 0-100, got {}",
                self.suspicious_activity_threshold
            )));
        }
        if self.id_verification && !self.webcam_required {
            return Err(ConfigError::Invalid(
                "id_verification requires webcam_required".to_string(),
            ));
        }
        let t = &self.timings;
        let periods = [
            ("presence_interval", t.presence_interval),
            ("audio_interval", t.audio_interval),
            ("performance_interval", t.performance_interval),
            ("heartbeat_interval", t.heartbeat_interval),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        Ok(())
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ProctoringConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proctor-core")
            .join("config.json")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Serde support for millisecond durations.
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
