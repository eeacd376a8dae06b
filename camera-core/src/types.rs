//! Core types shared by the session manager and the event engine

use std::fmt;
use std::time::Duration;

use camera_api::{Brand, CameraEvent, CameraModel, EventState, StreamType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Zero-based camera channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CameraIndex(pub u16);

impl CameraIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CameraIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for CameraIndex {
    fn from(index: u16) -> Self {
        CameraIndex(index)
    }
}

/// A camera together with one of its streams
///
/// Flattened, the main stream of camera `n` is `n` and its sub stream is
/// `n + max_cameras`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeIndex {
    pub camera: CameraIndex,
    pub stream: StreamType,
}

impl CompositeIndex {
    pub fn new(camera: CameraIndex, stream: StreamType) -> Self {
        Self { camera, stream }
    }

    pub fn flatten(self, max_cameras: usize) -> usize {
        self.camera.as_usize() + self.stream.index() * max_cameras
    }

    pub fn from_flat(index: usize, max_cameras: usize) -> Option<Self> {
        if max_cameras == 0 || index >= max_cameras * StreamType::ALL.len() {
            return None;
        }
        let camera = CameraIndex(u16::try_from(index % max_cameras).ok()?);
        let stream = StreamType::ALL[index / max_cameras];
        Some(Self { camera, stream })
    }
}

impl fmt::Display for CompositeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stream = match self.stream {
            StreamType::Main => "main",
            StreamType::Sub => "sub",
        };
        write!(f, "camera {} {stream} stream", self.camera)
    }
}

/// Recorder hardware the engine runs on; decides the channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HardwareVariant {
    Nvr8,
    #[default]
    Nvr16,
    Nvr32,
    Nvr64,
}

impl HardwareVariant {
    pub fn max_cameras(self) -> usize {
        match self {
            HardwareVariant::Nvr8 => 8,
            HardwareVariant::Nvr16 => 16,
            HardwareVariant::Nvr32 => 32,
            HardwareVariant::Nvr64 => 64,
        }
    }
}

/// Recording-side settings of a camera channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub enabled: bool,
    pub name: String,
    pub motion_detection: bool,
    /// How long a motion alarm stays active after the last detection
    pub redetection_delay: Duration,
    pub no_motion_detection: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: String::new(),
            motion_detection: true,
            redetection_delay: Duration::from_secs(10),
            no_motion_detection: false,
        }
    }
}

impl CameraConfig {
    /// Whether detection is switched on for a health-tracked event
    pub fn detection_enabled(&self, event: CameraEvent) -> bool {
        match event {
            CameraEvent::MotionDetect => self.motion_detection,
            CameraEvent::NoMotion => self.no_motion_detection,
            _ => true,
        }
    }
}

/// How a camera entered the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AddMode {
    #[default]
    Manual,
    /// Discovered and added without a user-provided configuration
    AutoConfig,
}

/// Network side of a camera channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpCameraConfig {
    pub brand: Brand,
    pub model: CameraModel,
    pub address: String,
    pub http_port: u16,
    /// Vendor command channel, used by brands that speak framed TCP
    pub tcp_port: u16,
    pub username: String,
    pub password: String,
    /// Events are taken from an ONVIF pull-point subscription
    pub onvif: bool,
    pub added_by: AddMode,
}

impl IpCameraConfig {
    pub fn new(brand: Brand, model: CameraModel, address: impl Into<String>) -> Self {
        Self {
            brand,
            model,
            address: address.into(),
            http_port: 80,
            tcp_port: 9000,
            username: String::new(),
            password: String::new(),
            onvif: false,
            added_by: AddMode::Manual,
        }
    }

    pub fn with_onvif(mut self, onvif: bool) -> Self {
        self.onvif = onvif;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn is_auto_config(&self) -> bool {
        self.added_by == AddMode::AutoConfig
    }
}

/// Where a notification for an event goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyRoute {
    /// Sent to network clients only
    NetworkOnly,
    /// Written to the event log and sent to network clients
    Logged,
}

impl NotifyRoute {
    /// Default routing of an event kind
    pub fn default_for(event: CameraEvent) -> Self {
        match event {
            CameraEvent::RecordingStart => NotifyRoute::NetworkOnly,
            _ => NotifyRoute::Logged,
        }
    }
}

/// Record handed to the event sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub camera: CameraIndex,
    pub event: CameraEvent,
    pub state: EventState,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn now(camera: CameraIndex, event: CameraEvent, state: EventState) -> Self {
        Self {
            camera,
            event,
            state,
            timestamp: Utc::now(),
        }
    }
}

/// Notification broadcast to engine subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub camera: CameraIndex,
    pub event: CameraEvent,
    pub state: EventState,
    pub route: NotifyRoute,
}
