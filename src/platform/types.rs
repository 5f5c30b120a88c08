//! Value types exchanged with the host environment.
//!
//! Signals carry only what the sensors need to classify behavior: key
//! combinations for shortcut detection, movement deltas for idle detection,
//! never typed content or screen contents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a media input/output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaDeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// One enumerated media device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub kind: MediaDeviceKind,
    pub label: String,
}

impl MediaDeviceInfo {
    pub fn new(
        device_id: impl Into<String>,
        kind: MediaDeviceKind,
        label: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            label: label.into(),
        }
    }
}

/// Which tracks to request from the camera/microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

/// A single RGBA video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA bytes, `width * height * 4` long
    pub rgba: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// A frame of one uniform gray level.
    pub fn uniform(width: u32, height: u32, level: u8) -> Self {
        let pixels = (width * height) as usize;
        let mut rgba = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            rgba.extend_from_slice(&[level, level, level, 255]);
        }
        Self::new(width, height, rgba)
    }

    /// A checkerboard alternating `level - spread` and `level + spread`.
    pub fn textured(width: u32, height: u32, level: u8, spread: u8) -> Self {
        let dark = level.saturating_sub(spread);
        let light = level.saturating_add(spread);
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if (x / 4 + y / 4) % 2 == 0 { dark } else { light };
                rgba.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Self::new(width, height, rgba)
    }

    /// Per-pixel luma (ITU-R BT.601 weights).
    pub fn luma(&self) -> impl Iterator<Item = f64> + '_ {
        self.rgba.chunks_exact(4).map(|px| {
            0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64
        })
    }
}

/// JS heap usage as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeapUsage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

impl HeapUsage {
    pub fn ratio(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.limit_bytes as f64
    }
}

/// Browser APIs relevant to proctoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCapabilities {
    pub fullscreen: bool,
    pub media_devices: bool,
    pub clipboard: bool,
    pub secure_context: bool,
}

impl Default for BrowserCapabilities {
    fn default() -> Self {
        Self {
            fullscreen: true,
            media_devices: true,
            clipboard: true,
            secure_context: true,
        }
    }
}

/// Environment fingerprint used for consistency checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserFingerprint {
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub hardware_concurrency: u32,
    pub timezone: String,
    pub screen_resolution: String,
    pub color_depth: u32,
}

impl BrowserFingerprint {
    /// Names and values of every captured field, in a fixed order.
    pub fn fields(&self) -> [(&'static str, String); 7] {
        [
            ("userAgent", self.user_agent.clone()),
            ("language", self.language.clone()),
            ("platform", self.platform.clone()),
            ("hardwareConcurrency", self.hardware_concurrency.to_string()),
            ("timezone", self.timezone.clone()),
            ("screenResolution", self.screen_resolution.clone()),
            ("colorDepth", self.color_depth.to_string()),
        ]
    }
}

/// Kind of host event a sensor can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Visibility,
    Blur,
    Focus,
    Copy,
    Cut,
    Paste,
    ContextMenu,
    KeyDown,
    MouseMove,
    MouseClick,
    SelectStart,
    DisplayMedia,
    DeviceChange,
    Online,
    Offline,
    ConnectionChange,
    FullscreenChange,
}

/// Whether a listener only observes or also prevents the default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerMode {
    Observe,
    Prevent,
}

/// Handle of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Clipboard operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

impl ClipboardAction {
    pub fn kind(&self) -> SignalKind {
        match self {
            ClipboardAction::Copy => SignalKind::Copy,
            ClipboardAction::Cut => SignalKind::Cut,
            ClipboardAction::Paste => SignalKind::Paste,
        }
    }
}

/// A key press with its modifier state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCombo {
    /// Key name as reported by the host (`"i"`, `"F12"`, `"Tab"`)
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyCombo {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            shift: false,
            alt: false,
            meta: false,
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Key name normalized for comparisons (`"I"` and `"i"` are equal).
    pub fn normalized_key(&self) -> String {
        self.key.to_ascii_lowercase()
    }
}

impl std::fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.meta {
            f.write_str("Meta+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.key.chars().count() == 1 {
            write!(f, "{}", self.key.to_ascii_uppercase())
        } else {
            f.write_str(&self.key)
        }
    }
}

/// An event delivered by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformSignal {
    VisibilityChange { hidden: bool },
    Blur,
    Focus,
    Clipboard { action: ClipboardAction },
    ContextMenu,
    KeyDown(KeyCombo),
    MouseMove { dx: f64, dy: f64 },
    MouseClick,
    /// Text selection started; `in_input` when inside a form field
    SelectStart { in_input: bool },
    /// The page asked to start screen sharing
    DisplayMediaRequested,
    DeviceChange,
    Online,
    Offline,
    ConnectionChange { effective_type: String },
    FullscreenChange { active: bool },
}

impl PlatformSignal {
    /// The listener kind this signal is delivered to.
    pub fn kind(&self) -> SignalKind {
        match self {
            PlatformSignal::VisibilityChange { .. } => SignalKind::Visibility,
            PlatformSignal::Blur => SignalKind::Blur,
            PlatformSignal::Focus => SignalKind::Focus,
            PlatformSignal::Clipboard { action } => action.kind(),
            PlatformSignal::ContextMenu => SignalKind::ContextMenu,
            PlatformSignal::KeyDown(_) => SignalKind::KeyDown,
            PlatformSignal::MouseMove { .. } => SignalKind::MouseMove,
            PlatformSignal::MouseClick => SignalKind::MouseClick,
            PlatformSignal::SelectStart { .. } => SignalKind::SelectStart,
            PlatformSignal::DisplayMediaRequested => SignalKind::DisplayMedia,
            PlatformSignal::DeviceChange => SignalKind::DeviceChange,
            PlatformSignal::Online => SignalKind::Online,
            PlatformSignal::Offline => SignalKind::Offline,
            PlatformSignal::ConnectionChange { .. } => SignalKind::ConnectionChange,
            PlatformSignal::FullscreenChange { .. } => SignalKind::FullscreenChange,
        }
    }
}

/// What the host should do with the event after the core has seen it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalDisposition {
    pub prevent_default: bool,
}

/// Camera/microphone acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("no matching device")]
    NotFound,
    #[error("device not readable: {0}")]
    NotReadable(String),
    #[error("request aborted: {0}")]
    Aborted(String),
}

/// Failures of document-level host operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error("{0}")]
    Failed(String),
}

/// A single face detection pass failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("face detection failed: {0}")]
pub struct DetectionError(pub String);

/// The face detection model could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("model load failed: {0}")]
pub struct ModelLoadError(pub String);
