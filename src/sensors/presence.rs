//! Vision sensor: face presence and lighting.
//!
//! Two detector variants share one contract. [`PreciseDetector`] wraps the
//! host's face model; [`HeuristicDetector`] estimates presence from the
//! brightness variance of the frame. When the model is missing, fails to
//! load, or errors on a frame, the heuristic answers instead.

use super::ViolationSink;
use crate::core::violation::{Severity, ViolationEvent, ViolationType};
use crate::platform::{DetectionError, FaceModel, FaceModelLoader, ModelLoadError, VideoFrame};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use statrs::statistics::Statistics;
use tracing::{debug, info, warn};

/// Sustained absence longer than this is reported.
const NO_FACE_GRACE_MS: i64 = 3_000;

/// Sustained extra faces longer than this are reported.
const MULTIPLE_FACES_GRACE_MS: i64 = 2_000;

/// Luma variance above which the heuristic assumes a face is in frame.
const FACE_VARIANCE_THRESHOLD: f64 = 400.0;

/// Mean luma range in which the heuristic trusts the variance signal.
const FACE_BRIGHTNESS_RANGE: (f64, f64) = (40.0, 220.0);

/// Mean luma range considered adequate lighting.
const LIGHTING_RANGE: (f64, f64) = (50.0, 210.0);

/// Counts faces in a video frame.
pub trait FaceDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<usize, DetectionError>;

    fn name(&self) -> &'static str;
}

/// Detector backed by the host's face model.
pub struct PreciseDetector {
    model: Box<dyn FaceModel>,
}

impl PreciseDetector {
    pub fn new(model: Box<dyn FaceModel>) -> Self {
        Self { model }
    }
}

impl FaceDetector for PreciseDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<usize, DetectionError> {
        self.model.detect(frame)
    }

    fn name(&self) -> &'static str {
        "precise"
    }
}

/// Brightness-variance fallback: one face or none.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDetector;

impl FaceDetector for HeuristicDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<usize, DetectionError> {
        let luma: Vec<f64> = frame.luma().collect();
        if luma.is_empty() {
            return Ok(0);
        }
        let mean = luma.iter().mean();
        let variance = luma.iter().population_variance();

        let (low, high) = FACE_BRIGHTNESS_RANGE;
        let present = variance > FACE_VARIANCE_THRESHOLD && mean > low && mean < high;
        Ok(usize::from(present))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Result of a lighting check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingReport {
    /// Mean luma of the frame (0-255)
    pub brightness: f64,
    pub adequate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

/// Polls camera frames and reports sustained absence or extra people.
pub struct PresenceDetector {
    sink: ViolationSink,
    /// Tried in order; the heuristic is always last.
    detectors: Vec<Box<dyn FaceDetector>>,
    running: bool,
    no_face_since: Option<DateTime<Utc>>,
    multiple_since: Option<DateTime<Utc>>,
}

impl PresenceDetector {
    pub fn new(sink: ViolationSink) -> Self {
        Self {
            sink,
            detectors: vec![Box::new(HeuristicDetector)],
            running: false,
            no_face_since: None,
            multiple_since: None,
        }
    }

    /// Load the face model, falling back to the heuristic on failure.
    ///
    /// With `strict` a load failure is returned instead of degrading.
    pub async fn initialize(
        &mut self,
        loader: Option<&dyn FaceModelLoader>,
        strict: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ModelLoadError> {
        let outcome = match loader {
            Some(loader) => loader.load().await,
            None => Err(ModelLoadError("no face model provided by host".to_string())),
        };

        self.detectors.clear();
        self.detectors.push(Box::new(HeuristicDetector));
        match outcome {
            Ok(model) => {
                info!("face detection model loaded");
                self.detectors.insert(0, Box::new(PreciseDetector::new(model)));
                Ok(())
            }
            Err(e) if strict => Err(e),
            Err(e) => {
                warn!(error = %e, "face model unavailable; using heuristic detection");
                self.sink.report(ViolationEvent::new(
                    ViolationType::SuspiciousMovement,
                    Severity::Medium,
                    "Face detection degraded to fallback mode",
                    now,
                ));
                Ok(())
            }
        }
    }

    /// Whether the heuristic is the primary detector.
    pub fn uses_fallback(&self) -> bool {
        self.detectors.len() < 2
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.no_face_since = None;
        self.multiple_since = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Count faces in `frame` with the first detector that succeeds.
    pub fn detect_faces(&self, frame: &VideoFrame) -> usize {
        for detector in &self.detectors {
            match detector.detect(frame) {
                Ok(count) => return count,
                Err(e) => debug!(detector = detector.name(), error = %e, "detection failed"),
            }
        }
        0
    }

    /// Judge whether the frame is lit well enough for detection.
    pub fn check_lighting(&self, frame: &VideoFrame) -> LightingReport {
        let luma: Vec<f64> = frame.luma().collect();
        if luma.is_empty() {
            return LightingReport {
                brightness: 0.0,
                adequate: false,
                issue: Some("No video signal".to_string()),
            };
        }
        let brightness = luma.iter().mean();
        let (low, high) = LIGHTING_RANGE;
        let issue = if brightness < low {
            Some("Lighting is too dark".to_string())
        } else if brightness > high {
            Some("Lighting is too bright".to_string())
        } else {
            None
        };
        LightingReport {
            brightness,
            adequate: issue.is_none(),
            issue,
        }
    }

    /// One polling tick. A missing frame skips the tick.
    pub fn poll(&mut self, frame: Option<&VideoFrame>, now: DateTime<Utc>) {
        if !self.running {
            return;
        }
        let Some(frame) = frame else {
            debug!("no video frame available");
            return;
        };
        let faces = self.detect_faces(frame);
        self.evaluate(faces, now);
    }

    fn evaluate(&mut self, faces: usize, now: DateTime<Utc>) {
        match faces {
            0 => {
                self.multiple_since = None;
                let since = *self.no_face_since.get_or_insert(now);
                if now - since > Duration::milliseconds(NO_FACE_GRACE_MS) {
                    self.no_face_since = Some(now);
                    self.sink.report(ViolationEvent::new(
                        ViolationType::FaceNotDetected,
                        Severity::High,
                        "No face detected in camera",
                        now,
                    ));
                }
            }
            1 => {
                self.no_face_since = None;
                self.multiple_since = None;
            }
            n => {
                self.no_face_since = None;
                let since = *self.multiple_since.get_or_insert(now);
                if now - since > Duration::milliseconds(MULTIPLE_FACES_GRACE_MS) {
                    self.multiple_since = Some(now);
                    self.sink.report(
                        ViolationEvent::new(
                            ViolationType::MultipleFaces,
                            Severity::High,
                            format!("Multiple faces detected ({n})"),
                            now,
                        )
                        .with_data(json!({ "faces": n })),
                    );
                }
            }
        }
    }
}
