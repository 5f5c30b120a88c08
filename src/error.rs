//! Error taxonomy of the monitoring core.
//!
//! Required-capability failures propagate out of `initialize()`/`start()`.
//! Best-effort failures never surface here; they degrade and are recorded
//! as violations instead.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the proctoring manager.
#[derive(Debug, Error)]
pub enum ProctoringError {
    /// Camera or microphone permission was denied.
    #[error("device access denied: {0}")]
    DeviceAccess(String),

    /// A required camera or microphone does not exist.
    #[error("required device not found: {0}")]
    DeviceNotFound(String),

    /// The face detection capability failed to load.
    #[error("face detection model failed to load: {0}")]
    ModelLoad(String),

    /// The camera stream did not become ready in time.
    #[error("camera stream not ready after {0:?}")]
    StreamTimeout(Duration),

    /// The configuration cannot be satisfied.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// `start()` was called before a successful `initialize()`.
    #[error("proctoring is not initialized")]
    NotInitialized,
}

impl ProctoringError {
    /// Actionable message the host can show to the student.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProctoringError::DeviceAccess(_) => {
                "Camera access denied. Please allow camera access in your browser settings."
            }
            ProctoringError::DeviceNotFound(_) => {
                "No camera was found. Please connect a camera to take this exam."
            }
            ProctoringError::ModelLoad(_) => {
                "Face detection could not be loaded. Please check your connection and reload."
            }
            ProctoringError::StreamTimeout(_) => {
                "Your camera did not start in time. Close other apps using the camera and retry."
            }
            ProctoringError::Configuration(_) => {
                "This exam's proctoring settings are invalid. Please contact your instructor."
            }
            ProctoringError::NotInitialized => {
                "Proctoring has not been set up yet. Please reload the exam page."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_is_actionable() {
        let err = ProctoringError::DeviceAccess("NotAllowedError".into());
        assert!(err.user_message().contains("allow camera access"));
        assert!(err.to_string().contains("NotAllowedError"));
    }
}
