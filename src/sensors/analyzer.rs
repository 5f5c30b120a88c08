//! Statistical and forensic heuristics.
//!
//! Live parts: audio level, performance stalls, heap pressure, device and
//! network changes. On-demand parts: pattern analysis over the ledger,
//! response-timing analysis and fingerprint consistency. The on-demand
//! checks return their findings instead of reporting them.

use super::{Subscriptions, ViolationSink};
use crate::config::ProctoringConfig;
use crate::core::violation::{Severity, ViolationEvent, ViolationType};
use crate::platform::{
    BrowserFingerprint, DocumentHost, HeapUsage, ListenerMode, PlatformSignal, SignalKind,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Nyquist frequency assumed for spectrum bins (48 kHz sampling).
const NYQUIST_HZ: f64 = 24_000.0;

/// Speech band in Hz.
const SPEECH_BAND_HZ: (f64, f64) = (300.0, 3_400.0);

/// Mean bin level above which the room is considered loud.
const LOUD_LEVEL: f64 = 30.0;

/// Mean speech-band level indicating someone talking.
const SPEECH_LEVEL: f64 = 60.0;

/// Below this mean level the spectrum is treated as silence.
const QUIET_LEVEL: f64 = 10.0;

/// High/low band ratio outside this range is atypical for one voice.
const VOICE_RATIO_RANGE: (f64, f64) = (0.25, 2.0);

/// Minimum gap between two audio findings of the same pattern.
const AUDIO_COOLDOWN_MS: i64 = 5_000;

/// A tick later than expected by more than this counts as a stall.
const STALL_TOLERANCE_MS: i64 = 100;

/// Consecutive stalls needed to report degradation.
const STALL_RUN: u32 = 3;

/// Heap usage ratio considered excessive.
const HEAP_RATIO_LIMIT: f64 = 0.8;

/// Rapid succession: more than this many violations inside the span.
const RAPID_COUNT: usize = 10;
const RAPID_SPAN_MS: i64 = 60_000;

/// Regular cadence: minimum sample, maximum mean gap, maximum gap deviation.
const CADENCE_MIN_VIOLATIONS: usize = 5;
const CADENCE_MAX_MEAN_MS: f64 = 10_000.0;
const CADENCE_MAX_STD_DEV_MS: f64 = 1_000.0;

/// One violation type occurring more than this many times is flagged.
const REPEATED_TYPE_LIMIT: usize = 8;

/// Response timing thresholds, seconds.
const CONSISTENT_MAX_MEAN_SECS: f64 = 30.0;
const CONSISTENT_MAX_STD_DEV_SECS: f64 = 2.0;
const FAST_ANSWER_SECS: f64 = 5.0;

/// Time a student spent on one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTiming {
    pub question_id: String,
    /// Seconds spent
    pub time_spent: f64,
}

/// Outcome of a fingerprint comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintCheck {
    pub consistent: bool,
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioPattern {
    Speech,
    MultipleVoices,
}

pub struct ViolationAnalyzer {
    sink: ViolationSink,
    audio_enabled: bool,
    expected_tick_ms: i64,
    subscriptions: Subscriptions,
    running: bool,
    last_tick: Option<DateTime<Utc>>,
    consecutive_stalls: u32,
    heap_flagged: bool,
    last_connection: Option<String>,
    last_speech_alert: Option<DateTime<Utc>>,
    last_voices_alert: Option<DateTime<Utc>>,
    baseline_fingerprint: Option<BrowserFingerprint>,
}

impl ViolationAnalyzer {
    pub fn new(config: &ProctoringConfig, sink: ViolationSink) -> Self {
        Self {
            sink,
            audio_enabled: config.microphone_monitoring,
            expected_tick_ms: config.timings.performance_interval.as_millis() as i64,
            subscriptions: Subscriptions::default(),
            running: false,
            last_tick: None,
            consecutive_stalls: 0,
            heap_flagged: false,
            last_connection: None,
            last_speech_alert: None,
            last_voices_alert: None,
            baseline_fingerprint: None,
        }
    }

    pub fn start(&mut self, document: &mut dyn DocumentHost, now: DateTime<Utc>) {
        if self.running {
            return;
        }
        for kind in [
            SignalKind::DeviceChange,
            SignalKind::Online,
            SignalKind::Offline,
            SignalKind::ConnectionChange,
        ] {
            self.subscriptions.subscribe(document, kind, ListenerMode::Observe);
        }
        self.last_connection = document.connection_type();
        if self.baseline_fingerprint.is_none() {
            self.baseline_fingerprint = Some(document.fingerprint());
        }
        self.last_tick = Some(now);
        self.consecutive_stalls = 0;
        self.running = true;
    }

    pub fn stop(&mut self, document: &mut dyn DocumentHost) {
        self.subscriptions.unsubscribe_all(document);
        self.running = false;
        self.last_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    /// Device and network change events.
    pub fn observe(&mut self, signal: &PlatformSignal, now: DateTime<Utc>) {
        if !self.subscriptions.is_listening(signal.kind()) {
            return;
        }
        match signal {
            PlatformSignal::DeviceChange => self.report(
                ViolationType::SuspiciousMovement,
                Severity::Medium,
                "Media devices changed during exam".to_string(),
                now,
            ),
            PlatformSignal::Offline => self.report(
                ViolationType::SuspiciousMovement,
                Severity::High,
                "Network connection lost".to_string(),
                now,
            ),
            PlatformSignal::Online => info!("network connection restored"),
            PlatformSignal::ConnectionChange { effective_type } => {
                let previous = self.last_connection.replace(effective_type.clone());
                if let Some(previous) = previous.filter(|p| p != effective_type) {
                    self.report(
                        ViolationType::SuspiciousMovement,
                        Severity::Low,
                        format!("Network connection changed from {previous} to {effective_type}"),
                        now,
                    );
                }
            }
            _ => {}
        }
    }

    /// Analyze one frequency-domain sample of the microphone track.
    pub fn analyze_audio(&mut self, spectrum: &[u8], now: DateTime<Utc>) {
        if !self.running || !self.audio_enabled || spectrum.is_empty() {
            return;
        }

        let bin_hz = NYQUIST_HZ / spectrum.len() as f64;
        let band_mean = |low_hz: f64, high_hz: f64| -> f64 {
            let values: Vec<f64> = spectrum
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    let hz = *i as f64 * bin_hz;
                    hz >= low_hz && hz < high_hz
                })
                .map(|(_, v)| *v as f64)
                .collect();
            if values.is_empty() {
                0.0
            } else {
                values.iter().mean()
            }
        };

        let level = spectrum.iter().map(|v| *v as f64).collect::<Vec<_>>().iter().mean();
        let (speech_low, speech_high) = SPEECH_BAND_HZ;
        let speech = band_mean(speech_low, speech_high);
        let low = band_mean(0.0, speech_low);
        let high = band_mean(speech_high, NYQUIST_HZ);

        if level > LOUD_LEVEL && speech > SPEECH_LEVEL {
            if self.audio_cooled_down(AudioPattern::Speech, now) {
                self.sink.report(
                    ViolationEvent::new(
                        ViolationType::AudioDetected,
                        Severity::Medium,
                        "Possible verbal communication detected",
                        now,
                    )
                    .with_data(json!({ "level": level, "speech": speech })),
                );
            }
            return;
        }

        if level > QUIET_LEVEL {
            let ratio = high / low.max(1.0);
            let (min_ratio, max_ratio) = VOICE_RATIO_RANGE;
            if (ratio < min_ratio || ratio > max_ratio)
                && self.audio_cooled_down(AudioPattern::MultipleVoices, now)
            {
                self.sink.report(
                    ViolationEvent::new(
                        ViolationType::AudioDetected,
                        Severity::Low,
                        "Unusual audio pattern, possible multiple voices",
                        now,
                    )
                    .with_data(json!({ "ratio": ratio })),
                );
            }
        }
    }

    /// Performance tick: timer stalls and heap pressure.
    pub fn performance_tick(&mut self, now: DateTime<Utc>, heap: Option<HeapUsage>) {
        if !self.running {
            return;
        }

        if let Some(last) = self.last_tick.replace(now) {
            let late_by = (now - last).num_milliseconds() - self.expected_tick_ms;
            if late_by > STALL_TOLERANCE_MS {
                self.consecutive_stalls += 1;
                debug!(late_by, stalls = self.consecutive_stalls, "timer stall");
            } else {
                self.consecutive_stalls = 0;
            }
            if self.consecutive_stalls >= STALL_RUN {
                self.consecutive_stalls = 0;
                self.report(
                    ViolationType::SuspiciousMovement,
                    Severity::Low,
                    "Performance degradation detected, possible background recording".to_string(),
                    now,
                );
            }
        }

        if let Some(heap) = heap {
            let ratio = heap.ratio();
            if ratio > HEAP_RATIO_LIMIT && !self.heap_flagged {
                self.heap_flagged = true;
                self.report(
                    ViolationType::SuspiciousMovement,
                    Severity::Low,
                    format!("High memory usage ({:.0}%)", ratio * 100.0),
                    now,
                );
            } else if ratio <= HEAP_RATIO_LIMIT {
                self.heap_flagged = false;
            }
        }
    }

    /// Look for suspicious structure in the whole ledger.
    pub fn analyze_patterns(
        violations: &[ViolationEvent],
        now: DateTime<Utc>,
    ) -> Vec<ViolationEvent> {
        let mut findings = Vec::new();
        let mut timestamps: Vec<DateTime<Utc>> = violations.iter().map(|v| v.timestamp).collect();
        timestamps.sort();

        if let Some(burst) = densest_burst(&timestamps, Duration::milliseconds(RAPID_SPAN_MS)) {
            if burst > RAPID_COUNT {
                findings.push(
                    ViolationEvent::new(
                        ViolationType::SuspiciousMovement,
                        Severity::High,
                        format!("Rapid succession of violations ({burst} within 60 seconds)"),
                        now,
                    )
                    .with_data(json!({ "count": burst })),
                );
            }
        }

        if timestamps.len() >= CADENCE_MIN_VIOLATIONS {
            let gaps: Vec<f64> = timestamps
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64)
                .collect();
            let mean = gaps.iter().mean();
            let std_dev = gaps.iter().population_std_dev();
            if mean < CADENCE_MAX_MEAN_MS && std_dev < CADENCE_MAX_STD_DEV_MS {
                findings.push(
                    ViolationEvent::new(
                        ViolationType::SuspiciousMovement,
                        Severity::High,
                        "Violations occur at regular intervals, possible automation",
                        now,
                    )
                    .with_data(json!({ "mean_gap_ms": mean, "std_dev_ms": std_dev })),
                );
            }
        }

        let mut by_type: BTreeMap<ViolationType, usize> = BTreeMap::new();
        for v in violations {
            *by_type.entry(v.violation_type).or_insert(0) += 1;
        }
        for (violation_type, count) in by_type {
            if violation_type != ViolationType::FaceNotDetected && count > REPEATED_TYPE_LIMIT {
                findings.push(
                    ViolationEvent::new(
                        ViolationType::SuspiciousMovement,
                        Severity::Medium,
                        format!("Repeated {violation_type} violations ({count})"),
                        now,
                    )
                    .with_data(json!({ "type": violation_type, "count": count })),
                );
            }
        }

        findings
    }

    /// Look for answer timings that suggest prior knowledge or automation.
    pub fn analyze_response_times(
        timings: &[ResponseTiming],
        now: DateTime<Utc>,
    ) -> Vec<ViolationEvent> {
        let mut findings = Vec::new();
        if timings.is_empty() {
            return findings;
        }
        let times: Vec<f64> = timings.iter().map(|t| t.time_spent).collect();
        let mean = times.iter().mean();

        if times.len() >= 3 {
            let std_dev = times.iter().population_std_dev();
            if mean < CONSISTENT_MAX_MEAN_SECS && std_dev < CONSISTENT_MAX_STD_DEV_SECS {
                findings.push(
                    ViolationEvent::new(
                        ViolationType::SuspiciousMovement,
                        Severity::Medium,
                        "Response times are suspiciously consistent",
                        now,
                    )
                    .with_data(json!({ "mean_secs": mean, "std_dev_secs": std_dev })),
                );
            }
        }

        let fast = times.iter().filter(|t| **t < FAST_ANSWER_SECS).count();
        if fast * 2 > times.len() {
            findings.push(
                ViolationEvent::new(
                    ViolationType::SuspiciousMovement,
                    Severity::High,
                    format!("{fast} of {} answers submitted in under 5 seconds", times.len()),
                    now,
                )
                .with_data(json!({ "fast_answers": fast, "total": times.len() })),
            );
        }

        findings
    }

    /// Compare `current` to the first fingerprint seen.
    pub fn check_fingerprint(&mut self, current: BrowserFingerprint) -> FingerprintCheck {
        let Some(baseline) = &self.baseline_fingerprint else {
            self.baseline_fingerprint = Some(current);
            return FingerprintCheck {
                consistent: true,
                changes: Vec::new(),
            };
        };

        let changes: Vec<String> = baseline
            .fields()
            .into_iter()
            .zip(current.fields())
            .filter(|((_, before), (_, after))| before != after)
            .map(|((name, before), (_, after))| format!("{name}: {before} -> {after}"))
            .collect();

        FingerprintCheck {
            consistent: changes.is_empty(),
            changes,
        }
    }

    fn audio_cooled_down(&mut self, pattern: AudioPattern, now: DateTime<Utc>) -> bool {
        let slot = match pattern {
            AudioPattern::Speech => &mut self.last_speech_alert,
            AudioPattern::MultipleVoices => &mut self.last_voices_alert,
        };
        let ready = slot
            .map(|last| (now - last).num_milliseconds() >= AUDIO_COOLDOWN_MS)
            .unwrap_or(true);
        if ready {
            *slot = Some(now);
        }
        ready
    }

    fn report(
        &self,
        violation_type: ViolationType,
        severity: Severity,
        description: String,
        now: DateTime<Utc>,
    ) {
        self.sink
            .report(ViolationEvent::new(violation_type, severity, description, now));
    }
}

/// Largest number of sorted timestamps falling inside any `span`.
fn densest_burst(sorted: &[DateTime<Utc>], span: Duration) -> Option<usize> {
    if sorted.is_empty() {
        return None;
    }
    let mut best = 0;
    let mut start = 0;
    for end in 0..sorted.len() {
        while sorted[end] - sorted[start] > span {
            start += 1;
        }
        best = best.max(end - start + 1);
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedHost;
    use crate::sensors::violation_channel;
    use crossbeam_channel::Receiver;

    fn running_analyzer(
        config: &ProctoringConfig,
        host: &SimulatedHost,
        now: DateTime<Utc>,
    ) -> (ViolationAnalyzer, Receiver<ViolationEvent>) {
        let (sink, receiver) = violation_channel();
        let mut env = host.environment();
        let mut analyzer = ViolationAnalyzer::new(config, sink);
        analyzer.start(env.document.as_mut(), now);
        (analyzer, receiver)
    }

    fn ledger(gaps_ms: &[i64], violation_type: ViolationType) -> Vec<ViolationEvent> {
        let start = Utc::now() - Duration::hours(1);
        let mut at = start;
        let mut out = vec![ViolationEvent::new(violation_type, Severity::Low, "v", at)];
        for gap in gaps_ms {
            at += Duration::milliseconds(*gap);
            out.push(ViolationEvent::new(violation_type, Severity::Low, "v", at));
        }
        out
    }

    /// 256 bins; put `level` into the bins covering `[low_hz, high_hz)`.
    fn spectrum(bands: &[(f64, f64, u8)]) -> Vec<u8> {
        let bin_hz = NYQUIST_HZ / 256.0;
        (0..256)
            .map(|i| {
                let hz = i as f64 * bin_hz;
                bands
                    .iter()
                    .find(|(low, high, _)| hz >= *low && hz < *high)
                    .map(|(_, _, level)| *level)
                    .unwrap_or(0)
            })
            .collect()
    }

    #[test]
    fn test_device_and_network_events() {
        let host = SimulatedHost::new();
        let now = Utc::now();
        let (mut analyzer, receiver) = running_analyzer(&ProctoringConfig::default(), &host, now);

        analyzer.observe(&PlatformSignal::DeviceChange, now);
        analyzer.observe(&PlatformSignal::Offline, now);
        analyzer.observe(&PlatformSignal::Online, now);
        analyzer.observe(
            &PlatformSignal::ConnectionChange {
                effective_type: "wifi".to_string(),
            },
            now,
        );
        analyzer.observe(
            &PlatformSignal::ConnectionChange {
                effective_type: "4g".to_string(),
            },
            now,
        );

        let severities: Vec<Severity> = receiver.try_iter().map(|v| v.severity).collect();
        assert_eq!(severities, vec![Severity::Medium, Severity::High, Severity::Low]);
    }

    #[test]
    fn test_speech_detection_with_cooldown() {
        let config = ProctoringConfig {
            microphone_monitoring: true,
            ..Default::default()
        };
        let host = SimulatedHost::new();
        let now = Utc::now();
        let (mut analyzer, receiver) = running_analyzer(&config, &host, now);

        let talking = spectrum(&[(0.0, 300.0, 80), (300.0, 3_400.0, 200), (3_400.0, 24_000.0, 20)]);
        analyzer.analyze_audio(&talking, now);
        analyzer.analyze_audio(&talking, now + Duration::seconds(1));
        analyzer.analyze_audio(&talking, now + Duration::seconds(6));

        let all: Vec<ViolationEvent> = receiver.try_iter().collect();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|v| v.violation_type == ViolationType::AudioDetected
            && v.severity == Severity::Medium));
    }

    #[test]
    fn test_unusual_band_ratio() {
        let config = ProctoringConfig {
            microphone_monitoring: true,
            ..Default::default()
        };
        let host = SimulatedHost::new();
        let now = Utc::now();
        let (mut analyzer, receiver) = running_analyzer(&config, &host, now);

        let hiss = spectrum(&[(0.0, 300.0, 5), (3_400.0, 24_000.0, 40)]);
        analyzer.analyze_audio(&hiss, now);
        let violation = receiver.try_recv().unwrap();
        assert_eq!(violation.severity, Severity::Low);

        analyzer.analyze_audio(&vec![0; 256], now + Duration::seconds(10));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_audio_ignored_when_disabled() {
        let host = SimulatedHost::new();
        let now = Utc::now();
        let (mut analyzer, receiver) = running_analyzer(&ProctoringConfig::default(), &host, now);

        analyzer.analyze_audio(&vec![255; 256], now);
        assert_eq!(receiver.try_iter().count(), 0);
    }

    #[test]
    fn test_three_consecutive_stalls() {
        let host = SimulatedHost::new();
        let start = Utc::now();
        let (mut analyzer, receiver) = running_analyzer(&ProctoringConfig::default(), &host, start);

        let mut at = start;
        // On time, then stalled, stalled, on time (resets), then three stalls.
        for delay in [5_000, 5_300, 5_300, 5_000, 5_300, 5_300] {
            at += Duration::milliseconds(delay);
            analyzer.performance_tick(at, None);
        }
        assert_eq!(receiver.try_iter().count(), 0);

        at += Duration::milliseconds(5_300);
        analyzer.performance_tick(at, None);
        let all: Vec<ViolationEvent> = receiver.try_iter().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].severity, Severity::Low);
    }

    #[test]
    fn test_heap_pressure_flagged_once() {
        let host = SimulatedHost::new();
        let start = Utc::now();
        let (mut analyzer, receiver) = running_analyzer(&ProctoringConfig::default(), &host, start);

        let high = HeapUsage {
            used_bytes: 85,
            limit_bytes: 100,
        };
        let low = HeapUsage {
            used_bytes: 20,
            limit_bytes: 100,
        };
        analyzer.performance_tick(start + Duration::seconds(5), Some(high));
        analyzer.performance_tick(start + Duration::seconds(10), Some(high));
        analyzer.performance_tick(start + Duration::seconds(15), Some(low));
        analyzer.performance_tick(start + Duration::seconds(20), Some(high));

        assert_eq!(receiver.try_iter().count(), 2);
    }

    #[test]
    fn test_rapid_succession_pattern() {
        let irregular = [1_000, 3_000, 500, 7_000, 2_000, 4_000, 1_500, 9_000, 600, 3_300];
        let burst = ledger(&irregular, ViolationType::WindowBlur);
        let findings = ViolationAnalyzer::analyze_patterns(&burst, Utc::now());
        assert!(findings
            .iter()
            .any(|f| f.severity == Severity::High && f.description.contains("Rapid succession")));

        let spread = ledger(&[30_000; 10], ViolationType::WindowBlur);
        let findings = ViolationAnalyzer::analyze_patterns(&spread, Utc::now());
        assert!(!findings.iter().any(|f| f.description.contains("Rapid succession")));
    }

    #[test]
    fn test_regular_cadence_pattern() {
        let regular = ledger(&[2_000, 2_050, 1_980, 2_010], ViolationType::CopyPaste);
        let findings = ViolationAnalyzer::analyze_patterns(&regular, Utc::now());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("regular intervals"));
        assert_eq!(findings[0].severity, Severity::High);

        let irregular = ledger(&[500, 9_000, 1_000, 6_000], ViolationType::CopyPaste);
        assert!(ViolationAnalyzer::analyze_patterns(&irregular, Utc::now()).is_empty());
    }

    #[test]
    fn test_repeated_type_pattern_excludes_face_not_detected() {
        let gaps = [70_000; 8];
        let faces = ledger(&gaps, ViolationType::FaceNotDetected);
        assert!(ViolationAnalyzer::analyze_patterns(&faces, Utc::now()).is_empty());

        let blurs = ledger(&gaps, ViolationType::WindowBlur);
        let findings = ViolationAnalyzer::analyze_patterns(&blurs, Utc::now());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert!(findings[0].description.contains("window_blur"));
    }

    #[test]
    fn test_response_time_analysis() {
        let timing = |secs: f64| ResponseTiming {
            question_id: format!("q{secs}"),
            time_spent: secs,
        };

        let consistent: Vec<_> = [12.0, 12.5, 11.8, 12.2].into_iter().map(timing).collect();
        let findings = ViolationAnalyzer::analyze_response_times(&consistent, Utc::now());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);

        let fast: Vec<_> = [2.0, 3.0, 45.0, 4.0, 90.0].into_iter().map(timing).collect();
        let findings = ViolationAnalyzer::analyze_response_times(&fast, Utc::now());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);

        let normal: Vec<_> = [40.0, 75.0, 20.0, 130.0].into_iter().map(timing).collect();
        assert!(ViolationAnalyzer::analyze_response_times(&normal, Utc::now()).is_empty());
        assert!(ViolationAnalyzer::analyze_response_times(&[], Utc::now()).is_empty());
    }

    #[test]
    fn test_fingerprint_consistency() {
        let host = SimulatedHost::new();
        let (sink, _rx) = violation_channel();
        let mut analyzer = ViolationAnalyzer::new(&ProctoringConfig::default(), sink);

        let first = host.fingerprint();
        assert!(analyzer.check_fingerprint(first.clone()).consistent);
        assert!(analyzer.check_fingerprint(first.clone()).consistent);

        let mut moved = first;
        moved.timezone = "Europe/Berlin".to_string();
        moved.screen_resolution = "2560x1440".to_string();
        let check = analyzer.check_fingerprint(moved);
        assert!(!check.consistent);
        assert_eq!(check.changes.len(), 2);
        assert!(check.changes[0].starts_with("timezone: UTC -> Europe/Berlin"));
    }
}
