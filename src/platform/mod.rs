//! Host environment boundary.
//!
//! The monitoring core never talks to a browser or OS directly. Everything
//! it needs from the host (devices, the camera stream, document-level
//! affordances, the face model) is expressed as a trait here, and host
//! events arrive as [`PlatformSignal`] values.
//!
//! All traits are `?Send`: the core runs on the host's single event loop.

pub mod simulated;
pub mod types;

use async_trait::async_trait;

pub use simulated::SimulatedHost;
pub use types::{
    BrowserCapabilities, BrowserFingerprint, ClipboardAction, DetectionError, HeapUsage, KeyCombo,
    ListenerId, ListenerMode, MediaConstraints, MediaDeviceInfo, MediaDeviceKind, MediaError,
    ModelLoadError, PlatformError, PlatformSignal, SignalDisposition, SignalKind, VideoFrame,
};

/// Camera/microphone discovery and acquisition.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// List available media devices.
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError>;

    /// Open a stream with the requested tracks.
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, MediaError>;
}

/// An open camera/microphone stream.
///
/// The manager exposes it to the host as the self-view video element.
#[async_trait(?Send)]
pub trait MediaStream {
    fn video_track_count(&self) -> usize;

    fn audio_track_count(&self) -> usize;

    /// Resolves once video metadata has loaded.
    async fn wait_ready(&mut self);

    /// Grab the current video frame, if one is available.
    fn capture_frame(&self) -> Option<VideoFrame>;

    /// Current byte frequency-domain bins of the audio track.
    fn audio_spectrum(&self) -> Option<Vec<u8>>;

    /// Stop every track of the stream.
    fn stop_tracks(&mut self);

    fn is_live(&self) -> bool;
}

/// Document-level host affordances.
#[async_trait(?Send)]
pub trait DocumentHost {
    /// Register interest in a signal kind.
    fn add_listener(&mut self, kind: SignalKind, mode: ListenerMode) -> ListenerId;

    /// Remove a listener; returns false if it was not registered.
    fn remove_listener(&mut self, id: ListenerId) -> bool;

    async fn request_fullscreen(&mut self) -> Result<(), PlatformError>;

    async fn exit_fullscreen(&mut self) -> Result<(), PlatformError>;

    fn is_fullscreen(&self) -> bool;

    /// Re-parent the document body into the lockdown overlay container.
    fn mount_overlay(&mut self) -> Result<(), PlatformError>;

    /// Undo [`DocumentHost::mount_overlay`].
    fn restore_layout(&mut self);

    /// Toggle text selection outside form inputs.
    fn set_selection_enabled(&mut self, enabled: bool);

    /// Wrap the screen-capture entry point so requests are reported as
    /// [`PlatformSignal::DisplayMediaRequested`] and then allowed through.
    fn intercept_display_media(&mut self) -> Result<(), PlatformError>;

    /// Undo [`DocumentHost::intercept_display_media`].
    fn restore_display_media(&mut self);

    fn capabilities(&self) -> BrowserCapabilities;

    fn memory_usage(&self) -> Option<HeapUsage>;

    /// Effective network connection type (`"4g"`, `"wifi"`), if known.
    fn connection_type(&self) -> Option<String>;

    fn fingerprint(&self) -> BrowserFingerprint;
}

/// A loaded face detection model.
pub trait FaceModel {
    fn detect(&self, frame: &VideoFrame) -> Result<usize, DetectionError>;
}

/// Loads the face detection model (typically over the network).
#[async_trait(?Send)]
pub trait FaceModelLoader {
    async fn load(&self) -> Result<Box<dyn FaceModel>, ModelLoadError>;
}

/// Everything the host provides to a proctoring session.
pub struct HostEnvironment {
    pub media: Box<dyn MediaDevices>,
    pub document: Box<dyn DocumentHost>,
    /// Absent when the host has no vision capability at all
    pub face_model: Option<Box<dyn FaceModelLoader>>,
}
