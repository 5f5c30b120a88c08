//! In-process host used by replays and tests.
//!
//! Every handle produced by [`SimulatedHost::environment`] shares one state
//! cell, so the owner of the `SimulatedHost` can both script what the
//! devices report and inspect what the core did (listeners left behind,
//! tracks still live, fullscreen state).

use super::types::{
    BrowserCapabilities, BrowserFingerprint, DetectionError, HeapUsage, ListenerId, ListenerMode,
    MediaConstraints, MediaDeviceInfo, MediaDeviceKind, MediaError, ModelLoadError, PlatformError,
    SignalKind, VideoFrame,
};
use super::{DocumentHost, FaceModel, FaceModelLoader, HostEnvironment, MediaDevices, MediaStream};
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

#[derive(Debug)]
struct SimState {
    devices: Vec<MediaDeviceInfo>,
    enumerate_error: Option<MediaError>,
    media_error: Option<MediaError>,
    stream_ready: bool,
    face_count: usize,
    brightness: u8,
    model_available: bool,
    model_load_fails: bool,
    detection_fails: bool,
    audio_spectrum: Option<Vec<u8>>,
    listeners: BTreeMap<u64, (SignalKind, ListenerMode)>,
    next_listener: u64,
    fullscreen: bool,
    overlay_mounted: bool,
    overlay_fails: bool,
    selection_enabled: bool,
    display_media_intercepted: bool,
    intercept_fails: bool,
    live_tracks: usize,
    streams_opened: usize,
    capabilities: BrowserCapabilities,
    memory: Option<HeapUsage>,
    connection_type: Option<String>,
    fingerprint: BrowserFingerprint,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            devices: vec![
                MediaDeviceInfo::new("cam-0", MediaDeviceKind::VideoInput, "Simulated Camera"),
                MediaDeviceInfo::new("mic-0", MediaDeviceKind::AudioInput, "Simulated Microphone"),
            ],
            enumerate_error: None,
            media_error: None,
            stream_ready: true,
            face_count: 1,
            brightness: 128,
            model_available: true,
            model_load_fails: false,
            detection_fails: false,
            audio_spectrum: None,
            listeners: BTreeMap::new(),
            next_listener: 1,
            fullscreen: false,
            overlay_mounted: false,
            overlay_fails: false,
            selection_enabled: true,
            display_media_intercepted: false,
            intercept_fails: false,
            live_tracks: 0,
            streams_opened: 0,
            capabilities: BrowserCapabilities::default(),
            memory: None,
            connection_type: Some("wifi".to_string()),
            fingerprint: BrowserFingerprint {
                user_agent: "SimulatedBrowser/1.0".to_string(),
                language: "en-US".to_string(),
                platform: "Linux x86_64".to_string(),
                hardware_concurrency: 8,
                timezone: "UTC".to_string(),
                screen_resolution: "1920x1080".to_string(),
                color_depth: 24,
            },
        }
    }
}

/// A scriptable host with a camera, a microphone and a face model.
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that enumerates no media devices at all.
    pub fn without_devices() -> Self {
        let host = Self::new();
        host.set_devices(Vec::new());
        host
    }

    /// Build the trait objects handed to the manager.
    pub fn environment(&self) -> HostEnvironment {
        let face_model: Option<Box<dyn FaceModelLoader>> = if self.state.borrow().model_available {
            Some(Box::new(SimModelLoader {
                state: self.state.clone(),
            }))
        } else {
            None
        };
        HostEnvironment {
            media: Box::new(SimMedia {
                state: self.state.clone(),
            }),
            document: Box::new(SimDocument {
                state: self.state.clone(),
            }),
            face_model,
        }
    }

    // Scripting

    pub fn set_devices(&self, devices: Vec<MediaDeviceInfo>) {
        self.state.borrow_mut().devices = devices;
    }

    pub fn fail_enumeration(&self, error: MediaError) {
        self.state.borrow_mut().enumerate_error = Some(error);
    }

    pub fn fail_media(&self, error: Option<MediaError>) {
        self.state.borrow_mut().media_error = error;
    }

    /// When false, opened streams never report ready.
    pub fn set_stream_ready(&self, ready: bool) {
        self.state.borrow_mut().stream_ready = ready;
    }

    /// Number of faces the camera shows.
    pub fn set_face_count(&self, count: usize) {
        self.state.borrow_mut().face_count = count;
    }

    /// Base gray level of captured frames.
    pub fn set_brightness(&self, level: u8) {
        self.state.borrow_mut().brightness = level;
    }

    /// Whether the host offers a face model loader at all.
    pub fn set_model_available(&self, available: bool) {
        self.state.borrow_mut().model_available = available;
    }

    pub fn fail_model_load(&self, fails: bool) {
        self.state.borrow_mut().model_load_fails = fails;
    }

    pub fn fail_detection(&self, fails: bool) {
        self.state.borrow_mut().detection_fails = fails;
    }

    pub fn set_audio_spectrum(&self, spectrum: Option<Vec<u8>>) {
        self.state.borrow_mut().audio_spectrum = spectrum;
    }

    pub fn fail_overlay(&self, fails: bool) {
        self.state.borrow_mut().overlay_fails = fails;
    }

    pub fn fail_display_media_interception(&self, fails: bool) {
        self.state.borrow_mut().intercept_fails = fails;
    }

    pub fn set_capabilities(&self, capabilities: BrowserCapabilities) {
        self.state.borrow_mut().capabilities = capabilities;
    }

    pub fn set_memory_usage(&self, usage: Option<HeapUsage>) {
        self.state.borrow_mut().memory = usage;
    }

    pub fn set_connection_type(&self, connection: Option<String>) {
        self.state.borrow_mut().connection_type = connection;
    }

    pub fn set_fingerprint(&self, fingerprint: BrowserFingerprint) {
        self.state.borrow_mut().fingerprint = fingerprint;
    }

    /// Simulate the user leaving fullscreen through the browser UI.
    pub fn leave_fullscreen(&self) {
        self.state.borrow_mut().fullscreen = false;
    }

    /// Simulate a page that was already fullscreen before monitoring.
    pub fn enter_fullscreen(&self) {
        self.state.borrow_mut().fullscreen = true;
    }

    // Inspection

    pub fn active_listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn listener_count(&self, kind: SignalKind, mode: ListenerMode) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|(k, m)| *k == kind && *m == mode)
            .count()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state.borrow().fullscreen
    }

    pub fn overlay_mounted(&self) -> bool {
        self.state.borrow().overlay_mounted
    }

    pub fn selection_enabled(&self) -> bool {
        self.state.borrow().selection_enabled
    }

    pub fn display_media_intercepted(&self) -> bool {
        self.state.borrow().display_media_intercepted
    }

    pub fn live_track_count(&self) -> usize {
        self.state.borrow().live_tracks
    }

    pub fn streams_opened(&self) -> usize {
        self.state.borrow().streams_opened
    }

    pub fn fingerprint(&self) -> BrowserFingerprint {
        self.state.borrow().fingerprint.clone()
    }
}

struct SimMedia {
    state: Rc<RefCell<SimState>>,
}

#[async_trait(?Send)]
impl MediaDevices for SimMedia {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        let state = self.state.borrow();
        match &state.enumerate_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.devices.clone()),
        }
    }

    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, MediaError> {
        let mut state = self.state.borrow_mut();
        if let Some(e) = &state.media_error {
            return Err(e.clone());
        }
        let has = |kind: MediaDeviceKind| state.devices.iter().any(|d| d.kind == kind);
        let video = constraints.video && has(MediaDeviceKind::VideoInput);
        let audio = constraints.audio && has(MediaDeviceKind::AudioInput);
        if constraints.video && !video {
            return Err(MediaError::NotFound);
        }

        let tracks = usize::from(video) + usize::from(audio);
        state.live_tracks += tracks;
        state.streams_opened += 1;

        Ok(Box::new(SimStream {
            state: self.state.clone(),
            video,
            audio,
            live: true,
        }))
    }
}

struct SimStream {
    state: Rc<RefCell<SimState>>,
    video: bool,
    audio: bool,
    live: bool,
}

#[async_trait(?Send)]
impl MediaStream for SimStream {
    fn video_track_count(&self) -> usize {
        usize::from(self.video)
    }

    fn audio_track_count(&self) -> usize {
        usize::from(self.audio)
    }

    async fn wait_ready(&mut self) {
        let ready = self.state.borrow().stream_ready;
        if !ready {
            std::future::pending::<()>().await;
        }
    }

    fn capture_frame(&self) -> Option<VideoFrame> {
        if !self.live || !self.video {
            return None;
        }
        let state = self.state.borrow();
        // Faces show up as texture; an empty scene is flat.
        if state.face_count == 0 {
            Some(VideoFrame::uniform(FRAME_WIDTH, FRAME_HEIGHT, state.brightness))
        } else {
            Some(VideoFrame::textured(
                FRAME_WIDTH,
                FRAME_HEIGHT,
                state.brightness,
                50,
            ))
        }
    }

    fn audio_spectrum(&self) -> Option<Vec<u8>> {
        if !self.live || !self.audio {
            return None;
        }
        self.state.borrow().audio_spectrum.clone()
    }

    fn stop_tracks(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        let tracks = self.video_track_count() + self.audio_track_count();
        let mut state = self.state.borrow_mut();
        state.live_tracks = state.live_tracks.saturating_sub(tracks);
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

struct SimDocument {
    state: Rc<RefCell<SimState>>,
}

#[async_trait(?Send)]
impl DocumentHost for SimDocument {
    fn add_listener(&mut self, kind: SignalKind, mode: ListenerMode) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id, (kind, mode));
        ListenerId(id)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.state.borrow_mut().listeners.remove(&id.0).is_some()
    }

    async fn request_fullscreen(&mut self) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if !state.capabilities.fullscreen {
            return Err(PlatformError::Unsupported("fullscreen"));
        }
        state.fullscreen = true;
        Ok(())
    }

    async fn exit_fullscreen(&mut self) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if !state.fullscreen {
            return Err(PlatformError::Failed("document is not fullscreen".to_string()));
        }
        state.fullscreen = false;
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.state.borrow().fullscreen
    }

    fn mount_overlay(&mut self) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if state.overlay_fails {
            return Err(PlatformError::Failed("overlay container rejected".to_string()));
        }
        state.overlay_mounted = true;
        Ok(())
    }

    fn restore_layout(&mut self) {
        self.state.borrow_mut().overlay_mounted = false;
    }

    fn set_selection_enabled(&mut self, enabled: bool) {
        self.state.borrow_mut().selection_enabled = enabled;
    }

    fn intercept_display_media(&mut self) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if state.intercept_fails {
            return Err(PlatformError::Unsupported("getDisplayMedia"));
        }
        state.display_media_intercepted = true;
        Ok(())
    }

    fn restore_display_media(&mut self) {
        self.state.borrow_mut().display_media_intercepted = false;
    }

    fn capabilities(&self) -> BrowserCapabilities {
        self.state.borrow().capabilities
    }

    fn memory_usage(&self) -> Option<HeapUsage> {
        self.state.borrow().memory
    }

    fn connection_type(&self) -> Option<String> {
        self.state.borrow().connection_type.clone()
    }

    fn fingerprint(&self) -> BrowserFingerprint {
        self.state.borrow().fingerprint.clone()
    }
}

struct SimModelLoader {
    state: Rc<RefCell<SimState>>,
}

#[async_trait(?Send)]
impl FaceModelLoader for SimModelLoader {
    async fn load(&self) -> Result<Box<dyn FaceModel>, ModelLoadError> {
        if self.state.borrow().model_load_fails {
            return Err(ModelLoadError("network error fetching weights".to_string()));
        }
        Ok(Box::new(SimModel {
            state: self.state.clone(),
        }))
    }
}

struct SimModel {
    state: Rc<RefCell<SimState>>,
}

impl FaceModel for SimModel {
    fn detect(&self, _frame: &VideoFrame) -> Result<usize, DetectionError> {
        let state = self.state.borrow();
        if state.detection_fails {
            return Err(DetectionError("inference backend unavailable".to_string()));
        }
        Ok(state.face_count)
    }
}
