//! Session orchestrator.
//!
//! ```text
//!  Uninitialized ──initialize()──▶ Initializing ──▶ Initialized
//!        ▲                              │                │
//!        └────────── on failure ────────┘             start()
//!                                                        ▼
//!                        Stopped ◀──stop() once unlocked── Active
//! ```
//!
//! The manager is the only component with cross-sensor knowledge. Sensors
//! report through a [`ViolationSink`]; the manager drains the matching
//! receiver after every dispatch and tick, appends to the ledger, rescores
//! and republishes state. Everything runs on one thread.

use crate::config::ProctoringConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::risk::compute_risk_score;
use crate::core::state::{
    EnvironmentScanResult, EvidenceExport, Phase, ProctoringState, SessionSummary, StopLatch,
};
use crate::core::violation::{Severity, ViolationEvent, ViolationType};
use crate::error::ProctoringError;
use crate::platform::{
    DocumentHost, FaceModelLoader, HostEnvironment, MediaConstraints, MediaDeviceKind,
    MediaDevices, MediaError, MediaStream, PlatformSignal, SignalDisposition,
};
use crate::sensors::{
    violation_channel, ActivityMonitor, FingerprintCheck, LockdownController, PresenceDetector,
    ResponseTiming, ViolationAnalyzer, ViolationSink,
};
use crate::transparency::{create_shared_log, SharedMonitoringLog};
use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

pub type ViolationHandler = Box<dyn FnMut(&ViolationEvent)>;
pub type StateChangeHandler = Box<dyn FnMut(&ProctoringState)>;

struct Sensors {
    activity: ActivityMonitor,
    presence: PresenceDetector,
    lockdown: LockdownController,
    analyzer: ViolationAnalyzer,
}

pub struct ProctoringManager {
    config: ProctoringConfig,
    clock: Box<dyn Clock>,
    media: Box<dyn MediaDevices>,
    document: Box<dyn DocumentHost>,
    face_model: Option<Box<dyn FaceModelLoader>>,
    state: ProctoringState,
    latch: StopLatch,
    stream: Option<Box<dyn MediaStream>>,
    sensors: Option<Sensors>,
    sink: ViolationSink,
    reports: Receiver<ViolationEvent>,
    on_violation: Option<ViolationHandler>,
    on_state_change: Option<StateChangeHandler>,
    monitoring: SharedMonitoringLog,
}

impl ProctoringManager {
    pub fn new(config: ProctoringConfig, host: HostEnvironment) -> Self {
        Self::with_clock(config, host, Box::new(SystemClock))
    }

    pub fn with_clock(
        config: ProctoringConfig,
        host: HostEnvironment,
        clock: Box<dyn Clock>,
    ) -> Self {
        let (sink, reports) = violation_channel();
        Self {
            config,
            clock,
            media: host.media,
            document: host.document,
            face_model: host.face_model,
            state: ProctoringState::new(),
            latch: StopLatch::Locked,
            stream: None,
            sensors: None,
            sink,
            reports,
            on_violation: None,
            on_state_change: None,
            monitoring: create_shared_log(),
        }
    }

    /// Count into an existing (for example persisted) monitoring log.
    pub fn with_monitoring_log(mut self, log: SharedMonitoringLog) -> Self {
        self.monitoring = log;
        self
    }

    pub fn config(&self) -> &ProctoringConfig {
        &self.config
    }

    /// Probe devices, open the camera if configured and build the sensors.
    ///
    /// A required capability that is missing fails the call and leaves the
    /// manager uninitialized with no stream held.
    pub async fn initialize(&mut self) -> Result<bool, ProctoringError> {
        if self.state.is_initialized {
            return Ok(true);
        }
        self.state.phase = Phase::Initializing;
        self.notify_state_change();

        match self.try_initialize().await {
            Ok(()) => {
                self.state.is_initialized = true;
                self.state.phase = Phase::Initialized;
                info!(
                    session_id = %self.state.session_id,
                    webcam = self.state.has_webcam,
                    microphone = self.state.has_microphone,
                    "proctoring initialized"
                );
                self.drain();
                self.notify_state_change();
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "proctoring initialization failed");
                self.release_stream();
                self.sensors = None;
                // Reports from a failed attempt never reach the ledger.
                while self.reports.try_recv().is_ok() {}
                self.state.is_initialized = false;
                self.state.phase = Phase::Uninitialized;
                self.notify_state_change();
                Err(e)
            }
        }
    }

    async fn try_initialize(&mut self) -> Result<(), ProctoringError> {
        self.config
            .validate()
            .map_err(|e| ProctoringError::Configuration(e.to_string()))?;

        let devices = match self.media.enumerate_devices().await {
            Ok(devices) => devices,
            Err(e) if self.config.webcam_required => return Err(device_error(e)),
            Err(e) => {
                warn!(error = %e, "device enumeration failed; assuming no devices");
                Vec::new()
            }
        };
        self.state.has_webcam = devices.iter().any(|d| d.kind == MediaDeviceKind::VideoInput);
        self.state.has_microphone = devices.iter().any(|d| d.kind == MediaDeviceKind::AudioInput);

        if self.config.webcam_required && !self.state.has_webcam {
            return Err(ProctoringError::DeviceNotFound(
                "no video input device".to_string(),
            ));
        }

        let now = self.clock.now();
        if self.config.needs_camera() {
            if self.state.has_webcam {
                if let Err(e) = self.open_stream().await {
                    if self.config.webcam_required {
                        return Err(e);
                    }
                    self.report_degraded("Camera unavailable, presence monitoring disabled", &e);
                }
            } else {
                self.monitoring.record_degraded();
                self.sink.report(ViolationEvent::new(
                    ViolationType::SuspiciousMovement,
                    Severity::Medium,
                    "No camera found, presence monitoring disabled",
                    now,
                ));
            }
        }

        let mut sensors = Sensors {
            activity: ActivityMonitor::new(&self.config, self.sink.clone()),
            presence: PresenceDetector::new(self.sink.clone()),
            lockdown: LockdownController::new(&self.config, self.sink.clone()),
            analyzer: ViolationAnalyzer::new(&self.config, self.sink.clone()),
        };
        if self.config.face_detection {
            sensors
                .presence
                .initialize(self.face_model.as_deref(), self.config.strict_face_model, now)
                .await
                .map_err(|e| ProctoringError::ModelLoad(e.0))?;
            if sensors.presence.uses_fallback() {
                self.monitoring.record_degraded();
            }
        }
        self.sensors = Some(sensors);
        Ok(())
    }

    async fn open_stream(&mut self) -> Result<(), ProctoringError> {
        let constraints = MediaConstraints {
            video: true,
            audio: self.config.microphone_monitoring && self.state.has_microphone,
        };
        let mut stream = self
            .media
            .get_user_media(constraints)
            .await
            .map_err(device_error)?;

        let limit = self.config.timings.stream_ready_timeout;
        if tokio::time::timeout(limit, stream.wait_ready()).await.is_err() {
            stream.stop_tracks();
            return Err(ProctoringError::StreamTimeout(limit));
        }

        debug!(
            video = stream.video_track_count(),
            audio = stream.audio_track_count(),
            "media stream ready"
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Begin monitoring. Starting an active session is a no-op.
    pub async fn start(&mut self) -> Result<(), ProctoringError> {
        if !self.state.is_initialized {
            return Err(ProctoringError::NotInitialized);
        }
        if self.state.is_active {
            return Ok(());
        }

        if self.config.needs_camera() && self.state.has_webcam && !self.stream_live() {
            self.release_stream();
            if let Err(e) = self.open_stream().await {
                if self.config.webcam_required {
                    return Err(e);
                }
                self.report_degraded("Camera unavailable, presence monitoring disabled", &e);
            }
        }

        let now = self.clock.now();
        let has_video = self
            .stream
            .as_ref()
            .is_some_and(|s| s.is_live() && s.video_track_count() > 0);
        let Some(sensors) = self.sensors.as_mut() else {
            return Err(ProctoringError::NotInitialized);
        };

        sensors.activity.start(self.document.as_mut(), now);
        if self.config.face_detection && has_video {
            sensors.presence.start();
        }
        sensors.analyzer.start(self.document.as_mut(), now);
        if self.config.browser_lockdown {
            sensors.lockdown.enable(self.document.as_mut()).await;
        }

        self.latch = StopLatch::Locked;
        self.state.is_active = true;
        self.state.phase = Phase::Active;
        self.state.last_heartbeat = Some(now);
        info!(session_id = %self.state.session_id, "proctoring started");

        self.drain();
        self.refresh_risk(now);
        self.notify_state_change();
        Ok(())
    }

    /// Release the stop latch. Called by the host when the exam ends.
    pub fn allow_stop(&mut self) {
        self.latch = StopLatch::Unlockable;
        info!("stop allowed by host");
    }

    pub fn can_stop(&self) -> bool {
        self.latch == StopLatch::Unlockable
    }

    /// Tear everything down, but only once the host allowed it.
    pub async fn stop(&mut self) {
        if self.latch == StopLatch::Locked {
            warn!("stop requested while monitoring is locked; ignoring");
            return;
        }

        if let Some(sensors) = self.sensors.as_mut() {
            sensors.activity.stop(self.document.as_mut());
            sensors.presence.stop();
            sensors.analyzer.stop(self.document.as_mut());
            sensors.lockdown.disable(self.document.as_mut()).await;
        }
        self.release_stream();

        let was_active = self.state.is_active;
        self.state.is_active = false;
        if self.state.is_initialized {
            self.state.phase = Phase::Stopped;
        }
        if was_active {
            info!(
                session_id = %self.state.session_id,
                violations = self.state.violations.len(),
                risk_score = self.state.risk_score,
                "proctoring stopped"
            );
        }

        self.drain();
        self.notify_state_change();
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    /// Dispatch a host event to the sensors listening for it.
    pub fn handle_signal(&mut self, signal: &PlatformSignal) -> SignalDisposition {
        let now = self.clock.now();
        let mut disposition = SignalDisposition::default();
        if let Some(sensors) = self.sensors.as_mut() {
            sensors.activity.observe(signal, now);
            sensors.analyzer.observe(signal, now);
            disposition = sensors.lockdown.intercept(signal, now);
        }
        self.monitoring.record_signal(disposition.prevent_default);
        self.drain();
        disposition
    }

    /// Presence timer: analyze the current camera frame.
    pub fn presence_tick(&mut self) {
        if !self.state.is_active {
            return;
        }
        let now = self.clock.now();
        let frame = self.stream.as_ref().and_then(|s| s.capture_frame());
        if let Some(sensors) = self.sensors.as_mut() {
            if sensors.presence.is_running() {
                if frame.is_some() {
                    self.monitoring.record_frame();
                }
                sensors.presence.poll(frame.as_ref(), now);
            }
        }
        self.drain();
    }

    /// Audio timer: analyze the current microphone spectrum.
    pub fn audio_tick(&mut self) {
        if !self.state.is_active {
            return;
        }
        let now = self.clock.now();
        let Some(spectrum) = self.stream.as_ref().and_then(|s| s.audio_spectrum()) else {
            return;
        };
        if let Some(sensors) = self.sensors.as_mut() {
            if sensors.analyzer.audio_enabled() {
                self.monitoring.record_audio_sample();
                sensors.analyzer.analyze_audio(&spectrum, now);
            }
        }
        self.drain();
    }

    /// Performance timer: stalls and heap pressure.
    pub fn performance_tick(&mut self) {
        if !self.state.is_active {
            return;
        }
        let now = self.clock.now();
        let heap = self.document.memory_usage();
        if let Some(sensors) = self.sensors.as_mut() {
            sensors.analyzer.performance_tick(now, heap);
        }
        self.drain();
    }

    /// Heartbeat: idle check, risk decay and a state republish.
    pub fn heartbeat(&mut self) {
        if !self.state.is_active {
            return;
        }
        let now = self.clock.now();
        self.state.last_heartbeat = Some(now);
        if let Some(sensors) = self.sensors.as_mut() {
            sensors.activity.check_idle(now);
        }
        self.drain();
        self.refresh_risk(now);
        self.notify_state_change();
    }

    /// One-shot preflight of lighting, framing and browser support.
    ///
    /// Does not touch session state.
    pub async fn perform_environment_scan(&self) -> EnvironmentScanResult {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let frame = self.stream.as_ref().and_then(|s| s.capture_frame());
        match (frame, self.sensors.as_ref()) {
            (Some(frame), Some(sensors)) => {
                let lighting = sensors.presence.check_lighting(&frame);
                if let Some(issue) = lighting.issue {
                    issues.push(issue);
                    recommendations
                        .push("Adjust the lighting so your face is clearly visible".to_string());
                }
                match sensors.presence.detect_faces(&frame) {
                    0 => {
                        issues.push("Face not visible in camera".to_string());
                        recommendations
                            .push("Position yourself in front of the camera".to_string());
                    }
                    1 => {}
                    _ => {
                        issues.push("Multiple people detected".to_string());
                        recommendations.push("Make sure you are alone in the room".to_string());
                    }
                }
            }
            _ => {
                issues.push("Camera is not available".to_string());
                recommendations.push("Connect a camera and allow camera access".to_string());
            }
        }

        let compatibility = LockdownController::check_compatibility(self.document.as_ref());
        if !compatibility.compatible {
            issues.extend(compatibility.issues);
            recommendations.push("Use an up-to-date browser over a secure connection".to_string());
        }

        EnvironmentScanResult {
            success: issues.is_empty(),
            issues,
            recommendations,
        }
    }

    /// Snapshot of the current state.
    pub fn get_state(&self) -> ProctoringState {
        self.state.clone()
    }

    pub fn get_summary(&self) -> SessionSummary {
        SessionSummary::from_state(
            &self.state,
            self.config.suspicious_activity_threshold,
            self.clock.now(),
        )
    }

    pub fn set_violation_handler(&mut self, handler: impl FnMut(&ViolationEvent) + 'static) {
        self.on_violation = Some(Box::new(handler));
    }

    pub fn set_state_change_handler(&mut self, handler: impl FnMut(&ProctoringState) + 'static) {
        self.on_state_change = Some(Box::new(handler));
    }

    /// The open camera stream, for the host's self-view preview.
    pub fn video(&self) -> Option<&dyn MediaStream> {
        self.stream.as_deref()
    }

    /// Structural findings over the ledger. Not added to the ledger.
    pub fn analyze_patterns(&self) -> Vec<ViolationEvent> {
        ViolationAnalyzer::analyze_patterns(&self.state.violations, self.clock.now())
    }

    /// Findings over per-question answer times. Not added to the ledger.
    pub fn analyze_response_times(&self, timings: &[ResponseTiming]) -> Vec<ViolationEvent> {
        ViolationAnalyzer::analyze_response_times(timings, self.clock.now())
    }

    /// Compare the host fingerprint with the one captured at start.
    pub fn check_fingerprint(&mut self) -> Result<FingerprintCheck, ProctoringError> {
        let current = self.document.fingerprint();
        let sensors = self.sensors.as_mut().ok_or(ProctoringError::NotInitialized)?;
        let check = sensors.analyzer.check_fingerprint(current);
        if !check.consistent {
            warn!(changes = ?check.changes, "browser fingerprint changed");
        }
        Ok(check)
    }

    /// The ledger and its summary, ready for the host to persist.
    pub fn export_evidence(&self) -> EvidenceExport {
        EvidenceExport {
            session_id: self.state.session_id,
            exported_at: self.clock.now(),
            summary: self.get_summary(),
            violations: self.state.violations.clone(),
        }
    }

    pub fn monitoring_log(&self) -> SharedMonitoringLog {
        self.monitoring.clone()
    }

    fn stream_live(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            debug!("media stream released");
        }
    }

    fn report_degraded(&mut self, description: &str, cause: &ProctoringError) {
        warn!(error = %cause, description, "capability degraded");
        self.monitoring.record_degraded();
        self.sink.report(ViolationEvent::new(
            ViolationType::SuspiciousMovement,
            Severity::Medium,
            description,
            self.clock.now(),
        ));
    }

    /// Move every pending sensor report into the ledger, in emission order.
    fn drain(&mut self) {
        let pending: Vec<ViolationEvent> = self.reports.try_iter().collect();
        for violation in pending {
            self.ingest(violation);
        }
    }

    fn ingest(&mut self, violation: ViolationEvent) {
        warn!(
            violation_type = %violation.violation_type,
            severity = ?violation.severity,
            description = %violation.description,
            "violation recorded"
        );
        self.monitoring.record_violation();
        self.state.violations.push(violation.clone());
        self.refresh_risk(self.clock.now());

        if let Some(handler) = self.on_violation.as_mut() {
            handler(&violation);
        }
        self.notify_state_change();
    }

    fn refresh_risk(&mut self, now: chrono::DateTime<chrono::Utc>) {
        let score = compute_risk_score(&self.state.violations, now);
        let threshold = self.config.suspicious_activity_threshold as f64;
        if score >= threshold && self.state.risk_score < threshold {
            warn!(score, threshold, "risk score reached suspicious activity threshold");
        }
        self.state.risk_score = score;
    }

    fn notify_state_change(&mut self) {
        if let Some(handler) = self.on_state_change.as_mut() {
            handler(&self.state);
        }
    }
}

fn device_error(e: MediaError) -> ProctoringError {
    match e {
        MediaError::NotFound => ProctoringError::DeviceNotFound(e.to_string()),
        MediaError::PermissionDenied | MediaError::NotReadable(_) | MediaError::Aborted(_) => {
            ProctoringError::DeviceAccess(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::platform::{ClipboardAction, ListenerMode, SignalKind, SimulatedHost};
    use chrono::{DateTime, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn start_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn manager_with(
        config: ProctoringConfig,
        host: &SimulatedHost,
    ) -> (ProctoringManager, ManualClock) {
        let clock = ManualClock::new(start_time());
        let manager =
            ProctoringManager::with_clock(config, host.environment(), Box::new(clock.clone()));
        (manager, clock)
    }

    async fn active_manager(host: &SimulatedHost) -> (ProctoringManager, ManualClock) {
        let (mut manager, clock) = manager_with(ProctoringConfig::default(), host);
        assert!(manager.initialize().await.unwrap());
        manager.start().await.unwrap();
        (manager, clock)
    }

    #[tokio::test]
    async fn test_initialize_and_start() {
        let host = SimulatedHost::new();
        let (manager, _clock) = active_manager(&host).await;

        let state = manager.get_state();
        assert!(state.is_initialized);
        assert!(state.is_active);
        assert_eq!(state.phase, Phase::Active);
        assert!(state.has_webcam);
        assert!(state.violations.is_empty());
        assert!(host.is_fullscreen());
        assert!(manager.video().is_some());
    }

    #[tokio::test]
    async fn test_start_requires_initialize() {
        let host = SimulatedHost::new();
        let (mut manager, _clock) = manager_with(ProctoringConfig::default(), &host);
        assert!(matches!(
            manager.start().await,
            Err(ProctoringError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let host = SimulatedHost::new();
        let (mut manager, _clock) = active_manager(&host).await;
        let listeners = host.active_listener_count();

        manager.start().await.unwrap();
        assert_eq!(host.active_listener_count(), listeners);
        assert_eq!(host.streams_opened(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_maps_to_device_access() {
        let host = SimulatedHost::new();
        host.fail_media(Some(MediaError::PermissionDenied));
        let (mut manager, _clock) = manager_with(ProctoringConfig::default(), &host);

        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, ProctoringError::DeviceAccess(_)));
        assert!(err.user_message().contains("allow camera access"));
        assert_eq!(manager.get_state().phase, Phase::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_timeout_releases_tracks() {
        let host = SimulatedHost::new();
        host.set_stream_ready(false);
        let (mut manager, _clock) = manager_with(ProctoringConfig::default(), &host);

        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, ProctoringError::StreamTimeout(_)));
        assert_eq!(host.live_track_count(), 0);
        assert!(!manager.get_state().is_initialized);
    }

    #[tokio::test]
    async fn test_optional_camera_failure_degrades() {
        let host = SimulatedHost::new();
        host.fail_media(Some(MediaError::NotReadable("busy".into())));
        let config = ProctoringConfig {
            webcam_required: false,
            ..Default::default()
        };
        let (mut manager, _clock) = manager_with(config, &host);

        assert!(manager.initialize().await.unwrap());
        let state = manager.get_state();
        assert_eq!(state.violations.len(), 1);
        assert_eq!(state.violations[0].severity, Severity::Medium);
        assert_eq!(manager.monitoring_log().stats().degraded_capabilities, 1);
    }

    #[tokio::test]
    async fn test_strict_face_model_fails_initialize() {
        let host = SimulatedHost::new();
        host.fail_model_load(true);
        let config = ProctoringConfig {
            strict_face_model: true,
            ..Default::default()
        };
        let (mut manager, _clock) = manager_with(config, &host);

        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, ProctoringError::ModelLoad(_)));
        assert_eq!(host.live_track_count(), 0);
        assert!(manager.get_state().violations.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let host = SimulatedHost::new();
        let config = ProctoringConfig {
            suspicious_activity_threshold: 150,
            ..Default::default()
        };
        let (mut manager, _clock) = manager_with(config, &host);
        assert!(matches!(
            manager.initialize().await,
            Err(ProctoringError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_signal_flow_into_ledger_and_handlers() {
        let host = SimulatedHost::new();
        let (mut manager, _clock) = active_manager(&host).await;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        manager.set_violation_handler(move |v| sink.borrow_mut().push(v.violation_type));
        let scores = Rc::new(RefCell::new(Vec::new()));
        let score_sink = scores.clone();
        manager.set_state_change_handler(move |s| score_sink.borrow_mut().push(s.risk_score));

        let disposition = manager.handle_signal(&PlatformSignal::Clipboard {
            action: ClipboardAction::Paste,
        });
        assert!(disposition.prevent_default);
        manager.handle_signal(&PlatformSignal::VisibilityChange { hidden: true });

        assert_eq!(
            *seen.borrow(),
            vec![ViolationType::CopyPaste, ViolationType::TabSwitch]
        );
        assert_eq!(*scores.borrow(), vec![25.0, 50.0]);
        assert_eq!(manager.get_state().risk_score, 50.0);
    }

    #[tokio::test]
    async fn test_heartbeat_decays_risk() {
        let host = SimulatedHost::new();
        let (mut manager, clock) = active_manager(&host).await;

        manager.handle_signal(&PlatformSignal::Blur);
        assert_eq!(manager.get_state().risk_score, 25.0);

        clock.advance_ms(300_000);
        manager.handle_signal(&PlatformSignal::MouseMove { dx: 3.0, dy: 1.0 });
        manager.heartbeat();
        let state = manager.get_state();
        assert_eq!(state.risk_score, 0.0);
        assert_eq!(state.violations.len(), 1);
        assert_eq!(state.last_heartbeat, Some(clock.now()));
    }

    #[tokio::test]
    async fn test_presence_tick_reports_absence() {
        let host = SimulatedHost::new();
        let (mut manager, clock) = active_manager(&host).await;
        host.set_face_count(0);

        for _ in 0..5 {
            manager.presence_tick();
            clock.advance_ms(1_000);
        }
        let state = manager.get_state();
        assert_eq!(state.violations.len(), 1);
        assert_eq!(state.violations[0].violation_type, ViolationType::FaceNotDetected);
        assert_eq!(manager.monitoring_log().stats().frames_analyzed, 5);
    }

    #[tokio::test]
    async fn test_stop_is_gated_by_latch() {
        let host = SimulatedHost::new();
        let (mut manager, _clock) = active_manager(&host).await;

        manager.stop().await;
        assert!(manager.is_active());
        assert_eq!(host.live_track_count(), 1);
        assert!(host.active_listener_count() > 0);

        manager.allow_stop();
        manager.stop().await;
        let state = manager.get_state();
        assert!(!state.is_active);
        assert_eq!(state.phase, Phase::Stopped);
        assert_eq!(host.live_track_count(), 0);
        assert_eq!(host.active_listener_count(), 0);
        assert!(!host.is_fullscreen());
        assert!(manager.video().is_none());
    }

    #[tokio::test]
    async fn test_restart_reacquires_stream_and_relocks() {
        let host = SimulatedHost::new();
        let (mut manager, _clock) = active_manager(&host).await;
        manager.allow_stop();
        manager.stop().await;

        manager.start().await.unwrap();
        assert!(manager.is_active());
        assert!(!manager.can_stop());
        assert_eq!(host.streams_opened(), 2);
        assert_eq!(host.live_track_count(), 1);
        assert_eq!(host.listener_count(SignalKind::Copy, ListenerMode::Prevent), 1);
    }

    #[tokio::test]
    async fn test_environment_scan_reports_issues() {
        let host = SimulatedHost::new();
        let (mut manager, _clock) = manager_with(ProctoringConfig::default(), &host);

        let before = manager.perform_environment_scan().await;
        assert!(!before.success);
        assert!(before.issues.iter().any(|i| i.contains("Camera")));

        manager.initialize().await.unwrap();
        assert!(manager.perform_environment_scan().await.success);

        host.set_face_count(0);
        host.set_brightness(20);
        let scan = manager.perform_environment_scan().await;
        assert!(!scan.success);
        assert!(scan.issues.contains(&"Lighting is too dark".to_string()));
        assert!(scan.issues.contains(&"Face not visible in camera".to_string()));
        assert_eq!(scan.recommendations.len(), 2);
        assert!(manager.get_state().violations.is_empty());
    }

    #[tokio::test]
    async fn test_fingerprint_and_export() {
        let host = SimulatedHost::new();
        let (mut manager, _clock) = active_manager(&host).await;
        assert!(manager.check_fingerprint().unwrap().consistent);

        let mut moved = host.fingerprint();
        moved.user_agent = "OtherBrowser/2.0".to_string();
        host.set_fingerprint(moved);
        let check = manager.check_fingerprint().unwrap();
        assert!(!check.consistent);

        manager.handle_signal(&PlatformSignal::ContextMenu);
        let export = manager.export_evidence();
        assert_eq!(export.session_id, manager.get_state().session_id);
        assert_eq!(export.violations.len(), 1);
        let parsed = EvidenceExport::from_json(&export.to_json().unwrap()).unwrap();
        assert_eq!(parsed, export);
    }
}
