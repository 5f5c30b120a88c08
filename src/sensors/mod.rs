//! Sensor services.
//!
//! Each sensor is independent of the others. Sensors hold no reference to
//! the session state; they only get a [`ViolationSink`] to report through.
//! The manager owns the matching receiver and drains it in FIFO order.

pub mod activity;
pub mod analyzer;
pub mod lockdown;
pub mod presence;

use crate::core::violation::ViolationEvent;
use crate::platform::{DocumentHost, ListenerId, ListenerMode, SignalKind};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

pub use activity::ActivityMonitor;
pub use analyzer::{FingerprintCheck, ResponseTiming, ViolationAnalyzer};
pub use lockdown::{CompatibilityReport, LockdownController};
pub use presence::{
    FaceDetector, HeuristicDetector, LightingReport, PreciseDetector, PresenceDetector,
};

/// Capacity of the violation channel between sensors and the manager.
const SINK_CAPACITY: usize = 10_000;

/// Narrow violation-reporting handle given to each sensor.
#[derive(Debug, Clone)]
pub struct ViolationSink {
    sender: Sender<ViolationEvent>,
}

impl ViolationSink {
    /// Report a violation to the manager.
    pub fn report(&self, violation: ViolationEvent) {
        match self.sender.try_send(violation) {
            Ok(()) => {}
            Err(TrySendError::Full(v)) => {
                tracing::error!(
                    violation_type = %v.violation_type,
                    "violation channel full; dropping"
                );
            }
            Err(TrySendError::Disconnected(v)) => {
                tracing::debug!(
                    violation_type = %v.violation_type,
                    "manager gone; dropping violation"
                );
            }
        }
    }
}

/// Create a sink and the receiver the manager drains.
pub fn violation_channel() -> (ViolationSink, Receiver<ViolationEvent>) {
    let (sender, receiver) = bounded(SINK_CAPACITY);
    (ViolationSink { sender }, receiver)
}

/// Listeners a sensor currently holds on the document.
#[derive(Debug, Default)]
pub struct Subscriptions {
    held: Vec<(SignalKind, ListenerId)>,
}

impl Subscriptions {
    pub fn subscribe(
        &mut self,
        document: &mut dyn DocumentHost,
        kind: SignalKind,
        mode: ListenerMode,
    ) {
        let id = document.add_listener(kind, mode);
        self.held.push((kind, id));
    }

    pub fn is_listening(&self, kind: SignalKind) -> bool {
        self.held.iter().any(|(k, _)| *k == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Remove every held listener; safe to call repeatedly.
    pub fn unsubscribe_all(&mut self, document: &mut dyn DocumentHost) {
        for (kind, id) in self.held.drain(..) {
            if !document.remove_listener(id) {
                tracing::debug!(?kind, "listener already removed");
            }
        }
    }
}
