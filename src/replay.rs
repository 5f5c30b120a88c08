//! Scripted session replay.
//!
//! A [`ReplayScript`] describes a simulated host and a timeline of events.
//! Replaying it drives a real [`ProctoringManager`] against a
//! [`SimulatedHost`] and a [`ManualClock`], firing the recurring timers at
//! their configured periods in between steps, so the outcome is fully
//! deterministic.

use crate::config::ProctoringConfig;
use crate::core::{
    Clock, ManualClock, ProctoringManager, ProctoringState, SessionSummary, ViolationEvent,
};
use crate::error::ProctoringError;
use crate::platform::{
    HeapUsage, MediaDeviceInfo, MediaDeviceKind, PlatformSignal, SimulatedHost,
};
use crate::transparency::{create_shared_log, MonitoringStats, SharedMonitoringLog};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read replay script: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse replay script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("session failed: {0}")]
    Session(#[from] ProctoringError),

    #[error("{field} out of range: {value} ms (allowed 0 to one day)")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Longest replayable session: one day.
pub const MAX_REPLAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Devices and capabilities of the simulated host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSetup {
    pub camera: bool,
    pub microphone: bool,
    pub face_model: bool,
    pub face_count: usize,
}

impl Default for HostSetup {
    fn default() -> Self {
        Self {
            camera: true,
            microphone: true,
            face_model: true,
            face_count: 1,
        }
    }
}

/// One thing that happens on the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    Signal { signal: PlatformSignal },
    FaceCount { count: usize },
    Brightness { level: u8 },
    AudioSpectrum { bins: Vec<u8> },
    MemoryUsage { used_bytes: u64, limit_bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    /// Offset from session start, milliseconds
    pub at_ms: i64,
    #[serde(flatten)]
    pub action: ReplayAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub config: ProctoringConfig,
    #[serde(default)]
    pub host: HostSetup,
    /// Wall-clock start of the session; defaults to the time of the replay
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Session length; defaults to the last step
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

/// What a replayed session produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub summary: SessionSummary,
    pub state: ProctoringState,
    pub pattern_findings: Vec<ViolationEvent>,
    pub monitoring: MonitoringStats,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Presence,
    Audio,
    Performance,
    Heartbeat,
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path)?;
        let script: Self = serde_json::from_str(&content)?;
        script.validate()?;
        Ok(script)
    }

    /// Reject offsets outside `0..=MAX_REPLAY_MS`.
    pub fn validate(&self) -> Result<(), ReplayError> {
        let in_range = |value: i64| (0..=MAX_REPLAY_MS).contains(&value);
        if let Some(value) = self.duration_ms.filter(|v| !in_range(*v)) {
            return Err(ReplayError::OutOfRange {
                field: "duration_ms",
                value,
            });
        }
        if let Some(step) = self.steps.iter().find(|s| !in_range(s.at_ms)) {
            return Err(ReplayError::OutOfRange {
                field: "at_ms",
                value: step.at_ms,
            });
        }
        Ok(())
    }

    fn simulated_host(&self) -> SimulatedHost {
        let host = SimulatedHost::new();
        let mut devices = Vec::new();
        if self.host.camera {
            devices.push(MediaDeviceInfo::new(
                "cam-0",
                MediaDeviceKind::VideoInput,
                "Replay Camera",
            ));
        }
        if self.host.microphone {
            devices.push(MediaDeviceInfo::new(
                "mic-0",
                MediaDeviceKind::AudioInput,
                "Replay Microphone",
            ));
        }
        host.set_devices(devices);
        host.set_model_available(self.host.face_model);
        host.set_face_count(self.host.face_count);
        host
    }

    /// Replay the script: initialize, start, play every step with the
    /// timers in between, then allow stop and stop.
    pub async fn run(&self) -> Result<ReplayOutcome, ReplayError> {
        self.run_with_log(create_shared_log()).await
    }

    /// Like [`run`](Self::run), counting into `monitoring`.
    pub async fn run_with_log(
        &self,
        monitoring: SharedMonitoringLog,
    ) -> Result<ReplayOutcome, ReplayError> {
        self.validate()?;
        let start = self.started_at.unwrap_or_else(Utc::now);
        let clock = ManualClock::new(start);
        let host = self.simulated_host();
        let mut manager = ProctoringManager::with_clock(
            self.config.clone(),
            host.environment(),
            Box::new(clock.clone()),
        )
        .with_monitoring_log(monitoring);

        manager.initialize().await?;
        manager.start().await?;

        let t = &self.config.timings;
        let periods = [
            (Timer::Presence, t.presence_interval.as_millis() as i64),
            (Timer::Audio, t.audio_interval.as_millis() as i64),
            (Timer::Performance, t.performance_interval.as_millis() as i64),
            (Timer::Heartbeat, t.heartbeat_interval.as_millis() as i64),
        ];
        let mut schedule = TimerSchedule::new(periods);

        let mut steps: Vec<&ReplayStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.at_ms);
        let end_ms = self
            .duration_ms
            .or_else(|| steps.last().map(|s| s.at_ms))
            .unwrap_or(0);

        for step in steps {
            schedule.run_until(step.at_ms, start, &clock, &mut manager);
            apply(&step.action, &host, &mut manager);
        }
        schedule.run_until(end_ms, start, &clock, &mut manager);

        let pattern_findings = manager.analyze_patterns();
        let summary = manager.get_summary();
        manager.allow_stop();
        manager.stop().await;

        info!(
            violations = summary.total_violations,
            risk_score = summary.final_risk_score,
            "replay finished"
        );
        Ok(ReplayOutcome {
            summary,
            state: manager.get_state(),
            pattern_findings,
            monitoring: manager.monitoring_log().stats(),
        })
    }
}

fn apply(action: &ReplayAction, host: &SimulatedHost, manager: &mut ProctoringManager) {
    match action {
        ReplayAction::Signal { signal } => {
            if let PlatformSignal::FullscreenChange { active: false } = signal {
                host.leave_fullscreen();
            }
            manager.handle_signal(signal);
        }
        ReplayAction::FaceCount { count } => host.set_face_count(*count),
        ReplayAction::Brightness { level } => host.set_brightness(*level),
        ReplayAction::AudioSpectrum { bins } => host.set_audio_spectrum(Some(bins.clone())),
        ReplayAction::MemoryUsage {
            used_bytes,
            limit_bytes,
        } => host.set_memory_usage(Some(HeapUsage {
            used_bytes: *used_bytes,
            limit_bytes: *limit_bytes,
        })),
    }
}

/// Next due offset of every timer, ties resolved in declaration order.
struct TimerSchedule {
    timers: Vec<(Timer, i64, i64)>,
}

impl TimerSchedule {
    fn new(periods: [(Timer, i64); 4]) -> Self {
        Self {
            timers: periods
                .into_iter()
                .map(|(timer, period)| (timer, period, period))
                .collect(),
        }
    }

    /// Fire every tick due at or before `until_ms`, then move the clock there.
    fn run_until(
        &mut self,
        until_ms: i64,
        start: DateTime<Utc>,
        clock: &ManualClock,
        manager: &mut ProctoringManager,
    ) {
        loop {
            let next = self
                .timers
                .iter_mut()
                .filter(|(_, _, due)| *due <= until_ms)
                .min_by_key(|(_, _, due)| *due);
            let Some((timer, period, due)) = next else {
                break;
            };
            clock.set(start + Duration::milliseconds(*due));
            match timer {
                Timer::Presence => manager.presence_tick(),
                Timer::Audio => manager.audio_tick(),
                Timer::Performance => manager.performance_tick(),
                Timer::Heartbeat => manager.heartbeat(),
            }
            *due += *period;
        }
        if clock.now() < start + Duration::milliseconds(until_ms) {
            clock.set(start + Duration::milliseconds(until_ms));
        }
    }
}
