//! Monitoring audit log.
//!
//! Counts what the proctoring session looked at and what it acted on, so
//! the candidate and the reviewer can see the extent of monitoring. It
//! stores counters only, never frames, audio or key content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct MonitoringLog {
    /// Host signals dispatched to sensors
    signals_processed: AtomicU64,
    /// Signals whose default action was blocked
    signals_prevented: AtomicU64,
    /// Presence frames analyzed
    frames_analyzed: AtomicU64,
    /// Audio spectra analyzed
    audio_samples: AtomicU64,
    /// Violations appended to the ledger
    violations_recorded: AtomicU64,
    /// Capabilities that fell back or were unavailable
    degraded_capabilities: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl MonitoringLog {
    pub fn new() -> Self {
        Self {
            signals_processed: AtomicU64::new(0),
            signals_prevented: AtomicU64::new(0),
            frames_analyzed: AtomicU64::new(0),
            audio_samples: AtomicU64::new(0),
            violations_recorded: AtomicU64::new(0),
            degraded_capabilities: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates across runs in `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);
        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous monitoring stats");
        }
        log
    }

    pub fn record_signal(&self, prevented: bool) {
        self.signals_processed.fetch_add(1, Ordering::Relaxed);
        if prevented {
            self.signals_prevented.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_frame(&self) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_sample(&self) {
        self.audio_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violation(&self) {
        self.violations_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded_capabilities.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> MonitoringStats {
        MonitoringStats {
            signals_processed: self.signals_processed.load(Ordering::Relaxed),
            signals_prevented: self.signals_prevented.load(Ordering::Relaxed),
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            audio_samples: self.audio_samples.load(Ordering::Relaxed),
            violations_recorded: self.violations_recorded.load(Ordering::Relaxed),
            degraded_capabilities: self.degraded_capabilities.load(Ordering::Relaxed),
            session_start: self.session_start,
        }
    }

    /// Human-readable summary for the end of a session.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Monitoring Statistics:\n\
             - Host signals processed: {}\n\
             - Actions blocked: {}\n\
             - Video frames analyzed: {}\n\
             - Audio samples analyzed: {}\n\
             - Violations recorded: {}\n\
             - Degraded capabilities: {}\n\
             \n\
             Data Handling:\n\
             - Video frames are analyzed in memory and discarded\n\
             - Audio is reduced to frequency levels, never recorded\n\
             - Key presses are matched against shortcuts only",
            stats.signals_processed,
            stats.signals_prevented,
            stats.frames_analyzed,
            stats.audio_samples,
            stats.violations_recorded,
            stats.degraded_capabilities,
        )
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let stats = self.stats();
            let persisted = PersistedStats {
                signals_processed: stats.signals_processed,
                signals_prevented: stats.signals_prevented,
                frames_analyzed: stats.frames_analyzed,
                audio_samples: stats.audio_samples,
                violations_recorded: stats.violations_recorded,
                degraded_capabilities: stats.degraded_capabilities,
                last_updated: Utc::now(),
            };
            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        let persisted: PersistedStats =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;

        self.signals_processed
            .store(persisted.signals_processed, Ordering::Relaxed);
        self.signals_prevented
            .store(persisted.signals_prevented, Ordering::Relaxed);
        self.frames_analyzed
            .store(persisted.frames_analyzed, Ordering::Relaxed);
        self.audio_samples
            .store(persisted.audio_samples, Ordering::Relaxed);
        self.violations_recorded
            .store(persisted.violations_recorded, Ordering::Relaxed);
        self.degraded_capabilities
            .store(persisted.degraded_capabilities, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for MonitoringLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the monitoring counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub signals_processed: u64,
    pub signals_prevented: u64,
    pub frames_analyzed: u64,
    pub audio_samples: u64,
    pub violations_recorded: u64,
    pub degraded_capabilities: u64,
    pub session_start: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    signals_processed: u64,
    signals_prevented: u64,
    frames_analyzed: u64,
    audio_samples: u64,
    violations_recorded: u64,
    degraded_capabilities: u64,
    last_updated: DateTime<Utc>,
}

pub type SharedMonitoringLog = Arc<MonitoringLog>;

pub fn create_shared_log() -> SharedMonitoringLog {
    Arc::new(MonitoringLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedMonitoringLog {
    Arc::new(MonitoringLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_counting() {
        let log = MonitoringLog::new();
        log.record_signal(false);
        log.record_signal(true);
        log.record_violation();

        let stats = log.stats();
        assert_eq!(stats.signals_processed, 2);
        assert_eq!(stats.signals_prevented, 1);
        assert_eq!(stats.violations_recorded, 1);
    }

    #[test]
    fn test_summary_mentions_data_handling() {
        let log = MonitoringLog::new();
        log.record_frame();
        let summary = log.summary();
        assert!(summary.contains("Video frames analyzed: 1"));
        assert!(summary.contains("never recorded"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitoring.json");

        let log = MonitoringLog::with_persistence(path.clone());
        log.record_audio_sample();
        log.record_degraded();
        log.save().unwrap();

        let reloaded = MonitoringLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.audio_samples, 1);
        assert_eq!(stats.degraded_capabilities, 1);
    }
}
