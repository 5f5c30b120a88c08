//! Proctor Core - exam-integrity monitoring engine.
//!
//! Supervises a student during a timed assessment and produces a
//! tamper-evidence trail: a chronological violation ledger with a live,
//! time-decaying risk score.
//!
//! # Guarantees
//!
//! - **Append-only ledger**: violations are never reordered or edited
//! - **Stop latch**: monitoring cannot end until the host allows it
//! - **Graceful degradation**: best-effort capabilities fall back and are
//!   recorded instead of aborting the session
//! - **Transparency**: every monitoring action is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Host (exam UI)                         │
//! └───────────┬───────────────────────────────────▲──────────────────┘
//!             │ PlatformSignal / ticks            │ state, violations
//! ┌───────────▼───────────────────────────────────┴──────────────────┐
//! │                        ProctoringManager                         │
//! │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐         │
//! │   │ Activity │  │ Presence │  │ Lockdown │  │ Analyzer │         │
//! │   └────┬─────┘  └────┬─────┘  └────┬─────┘  └────┬─────┘         │
//! │        └─────────────┴──── ViolationSink ────────┘               │
//! │                              │                                   │
//! │                  ledger ─▶ risk score ─▶ observers               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use proctor_core::{platform::SimulatedHost, ProctoringConfig, ProctoringManager};
//!
//! # async fn run() -> Result<(), proctor_core::ProctoringError> {
//! let host = SimulatedHost::new();
//! let mut manager = ProctoringManager::new(ProctoringConfig::default(), host.environment());
//! manager.initialize().await?;
//! manager.start().await?;
//!
//! // ... exam runs, host forwards signals and timer ticks ...
//!
//! manager.allow_stop();
//! manager.stop().await;
//! println!("{:?}", manager.get_summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod platform;
pub mod replay;
pub mod sensors;
pub mod transparency;

pub use config::{ConfigError, ProctoringConfig, SensorTimings};
pub use core::{
    EnvironmentScanResult, EvidenceExport, HostCommand, ProctoringManager, ProctoringState,
    SessionDriver, SessionSummary, Severity, ViolationEvent, ViolationType,
};
pub use error::ProctoringError;
pub use platform::{HostEnvironment, PlatformSignal, SignalDisposition};
pub use replay::{ReplayError, ReplayOutcome, ReplayScript};
pub use transparency::{MonitoringLog, MonitoringStats, SharedMonitoringLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Monitoring disclosure that can be displayed to students before an exam.
pub const MONITORING_DISCLOSURE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                PROCTORED EXAM - MONITORING NOTICE                ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This exam is monitored until your instructor ends it.           ║
║                                                                  ║
║  ✓ WHAT IS CHECKED:                                              ║
║    • Whether your face is visible to the camera                  ║
║    • Leaving the exam tab or window                              ║
║    • Copy, paste, right-click and blocked shortcuts              ║
║    • Background noise levels (if enabled)                        ║
║                                                                  ║
║  ✗ WHAT IS NEVER STORED:                                         ║
║    • Camera images or audio recordings                           ║
║    • The content of anything you type                            ║
║                                                                  ║
║  Detected events are recorded with a timestamp and shared with   ║
║  your instructor together with a summary.                        ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disclosure_contents() {
        assert!(MONITORING_DISCLOSURE.contains("MONITORING NOTICE"));
        assert!(MONITORING_DISCLOSURE.contains("NEVER STORED"));
        assert!(MONITORING_DISCLOSURE.contains("face is visible"));
    }
}
