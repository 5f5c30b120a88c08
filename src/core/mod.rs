//! Core of the proctoring engine.
//!
//! This module contains:
//! - The violation model and risk scoring
//! - Session state, summaries and evidence export
//! - The session manager and its timer/command driver

pub mod clock;
pub mod driver;
pub mod manager;
pub mod risk;
pub mod state;
pub mod violation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{HostCommand, SessionDriver};
pub use manager::{ProctoringManager, StateChangeHandler, ViolationHandler};
pub use risk::{compute_risk_score, RISK_WINDOW_MS};
pub use state::{
    EnvironmentScanResult, EvidenceExport, Phase, ProctoringState, SessionSummary,
    SeverityBreakdown, StopLatch,
};
pub use violation::{Severity, ViolationEvent, ViolationType};
