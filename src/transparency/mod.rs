//! Transparency about what a proctoring session monitors.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, MonitoringLog, MonitoringStats,
    SharedMonitoringLog,
};
