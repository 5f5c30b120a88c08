//! Behavioral sensor: tab/focus loss, clipboard, context menu, keyboard
//! shortcuts, mouse anomalies and screen-share attempts.

use super::{Subscriptions, ViolationSink};
use crate::config::ProctoringConfig;
use crate::core::violation::{Severity, ViolationEvent, ViolationType};
use crate::platform::{
    ClipboardAction, DocumentHost, KeyCombo, ListenerMode, PlatformSignal, SignalKind,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Same shortcut reported at most once per this many milliseconds.
const SHORTCUT_COOLDOWN_MS: i64 = 1_000;

/// Clicks closer than this count toward a rapid-click run.
const RAPID_CLICK_SPACING_MS: i64 = 100;

/// A rapid-click run longer than this is reported.
const RAPID_CLICK_RUN: u32 = 5;

/// No mouse movement for this long signals possible absence.
const MOUSE_IDLE_MS: i64 = 5 * 60 * 1_000;

/// Signal kinds the monitor listens for while running.
const OBSERVED_KINDS: [SignalKind; 10] = [
    SignalKind::Visibility,
    SignalKind::Blur,
    SignalKind::Focus,
    SignalKind::Copy,
    SignalKind::Cut,
    SignalKind::Paste,
    SignalKind::ContextMenu,
    SignalKind::KeyDown,
    SignalKind::MouseMove,
    SignalKind::MouseClick,
];

/// Whether a key combination opens devtools, reloads, opens a new
/// tab/window or switches applications.
pub fn is_suspicious_shortcut(combo: &KeyCombo) -> bool {
    let primary = combo.ctrl || combo.meta;
    match combo.normalized_key().as_str() {
        "f12" | "f5" => true,
        "i" | "j" | "c" => (combo.ctrl && combo.shift) || (combo.meta && combo.alt),
        "u" | "r" | "t" | "n" | "w" => primary,
        "tab" => combo.alt || combo.meta,
        _ => false,
    }
}

/// Listens for behavioral signals and reports violations.
pub struct ActivityMonitor {
    allowed_tab_switches: u32,
    prevent_copy_paste: bool,
    prevent_right_click: bool,
    sink: ViolationSink,
    subscriptions: Subscriptions,
    display_media_intercepted: bool,
    tab_switches: u32,
    last_shortcut: HashMap<String, DateTime<Utc>>,
    last_click: Option<DateTime<Utc>>,
    rapid_click_run: u32,
    last_mouse_movement: Option<DateTime<Utc>>,
    idle_reported: bool,
}

impl ActivityMonitor {
    pub fn new(config: &ProctoringConfig, sink: ViolationSink) -> Self {
        Self {
            allowed_tab_switches: config.allowed_tab_switches,
            prevent_copy_paste: config.prevent_copy_paste,
            prevent_right_click: config.prevent_right_click,
            sink,
            subscriptions: Subscriptions::default(),
            display_media_intercepted: false,
            tab_switches: 0,
            last_shortcut: HashMap::new(),
            last_click: None,
            rapid_click_run: 0,
            last_mouse_movement: None,
            idle_reported: false,
        }
    }

    /// Register listeners and instrument screen-capture requests.
    ///
    /// Interception is best-effort: if the host refuses, a medium
    /// violation is recorded and monitoring continues without it.
    pub fn start(&mut self, document: &mut dyn DocumentHost, now: DateTime<Utc>) {
        if self.is_running() {
            return;
        }
        for kind in OBSERVED_KINDS {
            self.subscriptions.subscribe(document, kind, ListenerMode::Observe);
        }

        match document.intercept_display_media() {
            Ok(()) => {
                self.subscriptions
                    .subscribe(document, SignalKind::DisplayMedia, ListenerMode::Observe);
                self.display_media_intercepted = true;
            }
            Err(e) => {
                warn!(error = %e, "screen-capture interception unavailable");
                self.sink.report(ViolationEvent::new(
                    ViolationType::SuspiciousMovement,
                    Severity::Medium,
                    "Screen sharing detection unavailable",
                    now,
                ));
            }
        }

        self.last_mouse_movement = Some(now);
        self.idle_reported = false;
    }

    /// Remove every listener and undo the screen-capture instrumentation.
    pub fn stop(&mut self, document: &mut dyn DocumentHost) {
        self.subscriptions.unsubscribe_all(document);
        if self.display_media_intercepted {
            document.restore_display_media();
            self.display_media_intercepted = false;
        }
    }

    pub fn is_running(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Number of tab switches seen so far.
    pub fn tab_switch_count(&self) -> u32 {
        self.tab_switches
    }

    /// Classify one host signal. Signals without a held listener are ignored.
    pub fn observe(&mut self, signal: &PlatformSignal, now: DateTime<Utc>) {
        if !self.subscriptions.is_listening(signal.kind()) {
            return;
        }

        match signal {
            PlatformSignal::VisibilityChange { hidden: true } => self.on_tab_switch(now),
            PlatformSignal::VisibilityChange { hidden: false } => {}
            PlatformSignal::Blur => self.report(
                ViolationType::WindowBlur,
                Severity::Medium,
                "Exam window lost focus",
                now,
            ),
            PlatformSignal::Focus => debug!("exam window regained focus"),
            PlatformSignal::Clipboard { action } => self.on_clipboard(*action, now),
            PlatformSignal::ContextMenu => {
                if self.prevent_right_click {
                    self.report(
                        ViolationType::RightClick,
                        Severity::Low,
                        "Right-click attempted",
                        now,
                    );
                }
            }
            PlatformSignal::KeyDown(combo) => self.on_key_down(combo, now),
            PlatformSignal::MouseMove { .. } => {
                self.last_mouse_movement = Some(now);
                self.idle_reported = false;
            }
            PlatformSignal::MouseClick => self.on_click(now),
            PlatformSignal::DisplayMediaRequested => self.report(
                ViolationType::ScreenShareStopped,
                Severity::High,
                "Screen sharing attempt detected",
                now,
            ),
            _ => {}
        }
    }

    /// Report possible absence after five minutes without mouse movement.
    pub fn check_idle(&mut self, now: DateTime<Utc>) {
        let Some(last) = self.last_mouse_movement else {
            return;
        };
        if self.idle_reported || (now - last).num_milliseconds() < MOUSE_IDLE_MS {
            return;
        }
        self.idle_reported = true;
        self.report(
            ViolationType::SuspiciousMovement,
            Severity::Medium,
            "No mouse movement for 5 minutes",
            now,
        );
    }

    fn on_tab_switch(&mut self, now: DateTime<Utc>) {
        self.tab_switches += 1;
        let severity = if self.tab_switches > self.allowed_tab_switches {
            Severity::High
        } else {
            Severity::Medium
        };
        self.sink.report(
            ViolationEvent::new(
                ViolationType::TabSwitch,
                severity,
                format!("Tab switch detected ({} total)", self.tab_switches),
                now,
            )
            .with_data(json!({
                "count": self.tab_switches,
                "allowed": self.allowed_tab_switches,
            })),
        );
    }

    fn on_clipboard(&mut self, action: ClipboardAction, now: DateTime<Utc>) {
        if !self.prevent_copy_paste {
            return;
        }
        let description = match action {
            ClipboardAction::Copy => "Copy attempted",
            ClipboardAction::Cut => "Cut attempted",
            ClipboardAction::Paste => "Paste attempted",
        };
        self.report(ViolationType::CopyPaste, Severity::Medium, description, now);
    }

    fn on_key_down(&mut self, combo: &KeyCombo, now: DateTime<Utc>) {
        if !is_suspicious_shortcut(combo) {
            return;
        }
        let label = combo.to_string();
        if let Some(last) = self.last_shortcut.get(&label) {
            if (now - *last).num_milliseconds() < SHORTCUT_COOLDOWN_MS {
                return;
            }
        }
        self.last_shortcut.insert(label.clone(), now);
        self.sink.report(
            ViolationEvent::new(
                ViolationType::SuspiciousMovement,
                Severity::Medium,
                format!("Suspicious key combination: {label}"),
                now,
            )
            .with_data(json!({ "combo": label })),
        );
    }

    fn on_click(&mut self, now: DateTime<Utc>) {
        let rapid = self
            .last_click
            .map(|prev| now - prev < Duration::milliseconds(RAPID_CLICK_SPACING_MS))
            .unwrap_or(false);
        self.last_click = Some(now);

        self.rapid_click_run = if rapid { self.rapid_click_run + 1 } else { 1 };
        if self.rapid_click_run > RAPID_CLICK_RUN {
            self.rapid_click_run = 0;
            self.report(
                ViolationType::SuspiciousMovement,
                Severity::Low,
                "Rapid clicking detected, possible automation",
                now,
            );
        }
    }

    fn report(
        &self,
        violation_type: ViolationType,
        severity: Severity,
        description: &str,
        now: DateTime<Utc>,
    ) {
        self.sink
            .report(ViolationEvent::new(violation_type, severity, description, now));
    }
}
