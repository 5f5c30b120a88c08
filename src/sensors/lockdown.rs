//! Restriction actuator: fullscreen overlay, blocked clipboard/context
//! menu/shortcuts, disabled text selection.
//!
//! Unlike the other sensors this one prevents default actions. It observes
//! visibility and focus loss only for logging; reporting those is the
//! activity monitor's job, so lockdown can be toggled independently.

use super::activity::is_suspicious_shortcut;
use super::{Subscriptions, ViolationSink};
use crate::config::ProctoringConfig;
use crate::core::violation::{Severity, ViolationEvent, ViolationType};
use crate::platform::{DocumentHost, ListenerMode, PlatformSignal, SignalDisposition, SignalKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const PREVENTED_KINDS: [SignalKind; 6] = [
    SignalKind::Copy,
    SignalKind::Cut,
    SignalKind::Paste,
    SignalKind::ContextMenu,
    SignalKind::KeyDown,
    SignalKind::SelectStart,
];

const OBSERVED_KINDS: [SignalKind; 3] = [
    SignalKind::Visibility,
    SignalKind::Blur,
    SignalKind::FullscreenChange,
];

/// Browser support for the lockdown and monitoring features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    pub issues: Vec<String>,
}

pub struct LockdownController {
    sink: ViolationSink,
    report_fullscreen_exit: bool,
    subscriptions: Subscriptions,
    enabled: bool,
    overlay_mounted: bool,
    in_fullscreen: bool,
    /// Fullscreen was requested by `enable`, not found already active
    entered_fullscreen: bool,
    selection_disabled: bool,
}

impl LockdownController {
    pub fn new(config: &ProctoringConfig, sink: ViolationSink) -> Self {
        Self {
            sink,
            report_fullscreen_exit: config.prevent_tab_switch,
            subscriptions: Subscriptions::default(),
            enabled: false,
            overlay_mounted: false,
            in_fullscreen: false,
            entered_fullscreen: false,
            selection_disabled: false,
        }
    }

    /// Check which required browser features are present.
    pub fn check_compatibility(document: &dyn DocumentHost) -> CompatibilityReport {
        let caps = document.capabilities();
        let mut issues = Vec::new();
        if !caps.fullscreen {
            issues.push("Fullscreen mode is not supported".to_string());
        }
        if !caps.media_devices {
            issues.push("Camera access is not supported".to_string());
        }
        if !caps.clipboard {
            issues.push("Clipboard API is not supported".to_string());
        }
        if !caps.secure_context {
            issues.push("A secure (HTTPS) connection is required".to_string());
        }
        CompatibilityReport {
            compatible: issues.is_empty(),
            issues,
        }
    }

    /// Apply every restriction. Each step is best-effort.
    pub async fn enable(&mut self, document: &mut dyn DocumentHost) {
        if self.enabled {
            return;
        }
        self.enabled = true;

        match document.mount_overlay() {
            Ok(()) => self.overlay_mounted = true,
            Err(e) => warn!(error = %e, "could not mount lockdown overlay"),
        }
        if document.is_fullscreen() {
            self.in_fullscreen = true;
        } else {
            match document.request_fullscreen().await {
                Ok(()) => {
                    self.in_fullscreen = true;
                    self.entered_fullscreen = true;
                }
                Err(e) => warn!(error = %e, "fullscreen unavailable; continuing without it"),
            }
        }

        for kind in PREVENTED_KINDS {
            self.subscriptions.subscribe(document, kind, ListenerMode::Prevent);
        }
        for kind in OBSERVED_KINDS {
            self.subscriptions.subscribe(document, kind, ListenerMode::Observe);
        }

        document.set_selection_enabled(false);
        self.selection_disabled = true;

        info!(
            fullscreen = self.in_fullscreen,
            overlay = self.overlay_mounted,
            "lockdown enabled"
        );
    }

    /// Undo everything [`enable`](Self::enable) did. Idempotent, and safe
    /// before `enable` or after a partial one.
    pub async fn disable(&mut self, document: &mut dyn DocumentHost) {
        self.subscriptions.unsubscribe_all(document);

        if self.selection_disabled {
            document.set_selection_enabled(true);
            self.selection_disabled = false;
        }
        if self.entered_fullscreen && document.is_fullscreen() {
            if let Err(e) = document.exit_fullscreen().await {
                debug!(error = %e, "exit fullscreen failed");
            }
        }
        self.entered_fullscreen = false;
        self.in_fullscreen = false;
        if self.overlay_mounted {
            document.restore_layout();
            self.overlay_mounted = false;
        }

        if self.enabled {
            info!("lockdown disabled");
        }
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Decide whether the host should block `signal`, and record lost
    /// restrictions.
    pub fn intercept(&mut self, signal: &PlatformSignal, now: DateTime<Utc>) -> SignalDisposition {
        if !self.subscriptions.is_listening(signal.kind()) {
            return SignalDisposition::default();
        }

        let prevent_default = match signal {
            PlatformSignal::Clipboard { .. } | PlatformSignal::ContextMenu => true,
            PlatformSignal::KeyDown(combo) => is_suspicious_shortcut(combo),
            PlatformSignal::SelectStart { in_input } => !in_input,
            PlatformSignal::VisibilityChange { hidden } => {
                debug!(hidden, "visibility changed under lockdown");
                false
            }
            PlatformSignal::Blur => {
                debug!("focus lost under lockdown");
                false
            }
            PlatformSignal::FullscreenChange { active } => {
                self.on_fullscreen_change(*active, now);
                false
            }
            _ => false,
        };

        SignalDisposition { prevent_default }
    }

    fn on_fullscreen_change(&mut self, active: bool, now: DateTime<Utc>) {
        let was_fullscreen = self.in_fullscreen;
        self.in_fullscreen = active;
        if active || !was_fullscreen {
            return;
        }
        warn!("fullscreen exited during lockdown");
        if self.report_fullscreen_exit {
            self.sink.report(ViolationEvent::new(
                ViolationType::SuspiciousMovement,
                Severity::Medium,
                "Exited fullscreen mode",
                now,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{BrowserCapabilities, ClipboardAction, KeyCombo, SimulatedHost};
    use crate::sensors::violation_channel;

    fn controller() -> (LockdownController, crossbeam_channel::Receiver<ViolationEvent>) {
        let (sink, receiver) = violation_channel();
        (LockdownController::new(&ProctoringConfig::default(), sink), receiver)
    }

    #[tokio::test]
    async fn test_enable_applies_restrictions() {
        let host = SimulatedHost::new();
        let mut env = host.environment();
        let (mut lockdown, _rx) = controller();

        lockdown.enable(env.document.as_mut()).await;
        assert!(host.is_fullscreen());
        assert!(host.overlay_mounted());
        assert!(!host.selection_enabled());
        assert_eq!(host.listener_count(SignalKind::Copy, ListenerMode::Prevent), 1);

        // Enabling twice does not double-register.
        lockdown.enable(env.document.as_mut()).await;
        assert_eq!(host.listener_count(SignalKind::Copy, ListenerMode::Prevent), 1);
    }

    #[tokio::test]
    async fn test_disable_is_exact_inverse_and_idempotent() {
        let host = SimulatedHost::new();
        let mut env = host.environment();
        let (mut lockdown, _rx) = controller();

        lockdown.disable(env.document.as_mut()).await;

        lockdown.enable(env.document.as_mut()).await;
        lockdown.disable(env.document.as_mut()).await;
        lockdown.disable(env.document.as_mut()).await;

        assert!(!host.is_fullscreen());
        assert!(!host.overlay_mounted());
        assert!(host.selection_enabled());
        assert_eq!(host.active_listener_count(), 0);
        assert!(!lockdown.is_enabled());
    }

    #[tokio::test]
    async fn test_disable_leaves_preexisting_fullscreen() {
        let host = SimulatedHost::new();
        host.enter_fullscreen();
        let mut env = host.environment();
        let (mut lockdown, _rx) = controller();

        lockdown.enable(env.document.as_mut()).await;
        lockdown.disable(env.document.as_mut()).await;

        assert!(host.is_fullscreen());
        assert!(!host.overlay_mounted());
        assert_eq!(host.active_listener_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_enable_still_disables_cleanly() {
        let host = SimulatedHost::new();
        host.fail_overlay(true);
        host.set_capabilities(BrowserCapabilities {
            fullscreen: false,
            ..Default::default()
        });
        let mut env = host.environment();
        let (mut lockdown, _rx) = controller();

        lockdown.enable(env.document.as_mut()).await;
        assert!(lockdown.is_enabled());
        assert!(!host.is_fullscreen());

        lockdown.disable(env.document.as_mut()).await;
        assert_eq!(host.active_listener_count(), 0);
        assert!(host.selection_enabled());
    }

    #[tokio::test]
    async fn test_intercept_prevents_blocked_actions() {
        let host = SimulatedHost::new();
        let mut env = host.environment();
        let (mut lockdown, _rx) = controller();
        let now = Utc::now();

        let copy = PlatformSignal::Clipboard {
            action: ClipboardAction::Copy,
        };
        assert!(!lockdown.intercept(&copy, now).prevent_default);

        lockdown.enable(env.document.as_mut()).await;
        assert!(lockdown.intercept(&copy, now).prevent_default);
        assert!(lockdown.intercept(&PlatformSignal::ContextMenu, now).prevent_default);
        assert!(lockdown
            .intercept(&PlatformSignal::KeyDown(KeyCombo::key("F12")), now)
            .prevent_default);
        assert!(!lockdown
            .intercept(&PlatformSignal::KeyDown(KeyCombo::key("a")), now)
            .prevent_default);
        assert!(lockdown
            .intercept(&PlatformSignal::SelectStart { in_input: false }, now)
            .prevent_default);
        assert!(!lockdown
            .intercept(&PlatformSignal::SelectStart { in_input: true }, now)
            .prevent_default);
        assert!(!lockdown
            .intercept(&PlatformSignal::VisibilityChange { hidden: true }, now)
            .prevent_default);
    }

    #[tokio::test]
    async fn test_fullscreen_exit_is_reported() {
        let host = SimulatedHost::new();
        let mut env = host.environment();
        let (mut lockdown, receiver) = controller();
        lockdown.enable(env.document.as_mut()).await;

        host.leave_fullscreen();
        lockdown.intercept(&PlatformSignal::FullscreenChange { active: false }, Utc::now());
        lockdown.intercept(&PlatformSignal::FullscreenChange { active: false }, Utc::now());

        let all: Vec<ViolationEvent> = receiver.try_iter().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].severity, Severity::Medium);
    }

    #[test]
    fn test_compatibility_report() {
        let host = SimulatedHost::new();
        let env = host.environment();
        let report = LockdownController::check_compatibility(env.document.as_ref());
        assert!(report.compatible);
        assert!(report.issues.is_empty());

        host.set_capabilities(BrowserCapabilities {
            fullscreen: false,
            media_devices: true,
            clipboard: false,
            secure_context: false,
        });
        let report = LockdownController::check_compatibility(env.document.as_ref());
        assert!(!report.compatible);
        assert_eq!(report.issues.len(), 3);
        assert!(report.issues.iter().any(|i| i.contains("HTTPS")));
    }
}
