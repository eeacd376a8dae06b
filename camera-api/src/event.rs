//! Normalized camera event model

use serde::{Deserialize, Serialize};

/// Every event kind the NVR tracks per camera
///
/// The discriminant doubles as the index into per-camera event arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CameraEvent {
    MotionDetect,
    ViewTamper,
    Sensor1,
    Sensor2,
    Sensor3,
    /// Connectivity. `Active` means the camera is reachable.
    ConnectionFailure,
    RecordingFail,
    LineCross,
    Intrusion,
    AudioException,
    MissingObject,
    SuspiciousObject,
    Loitering,
    CameraOnline,
    RecordingStart,
    ObjectCounting,
    NoMotion,
}

impl CameraEvent {
    pub const COUNT: usize = 17;

    pub const ALL: [CameraEvent; Self::COUNT] = [
        CameraEvent::MotionDetect,
        CameraEvent::ViewTamper,
        CameraEvent::Sensor1,
        CameraEvent::Sensor2,
        CameraEvent::Sensor3,
        CameraEvent::ConnectionFailure,
        CameraEvent::RecordingFail,
        CameraEvent::LineCross,
        CameraEvent::Intrusion,
        CameraEvent::AudioException,
        CameraEvent::MissingObject,
        CameraEvent::SuspiciousObject,
        CameraEvent::Loitering,
        CameraEvent::CameraOnline,
        CameraEvent::RecordingStart,
        CameraEvent::ObjectCounting,
        CameraEvent::NoMotion,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Events generated by the NVR itself; never polled on the wire
    pub fn is_synthetic(self) -> bool {
        matches!(
            self,
            CameraEvent::ConnectionFailure
                | CameraEvent::RecordingFail
                | CameraEvent::RecordingStart
                | CameraEvent::CameraOnline
        )
    }

    /// Events the camera only ever reports as active; clearing is timer driven
    pub fn is_latching(self) -> bool {
        matches!(
            self,
            CameraEvent::LineCross
                | CameraEvent::Loitering
                | CameraEvent::ObjectCounting
                | CameraEvent::Intrusion
        )
    }

    /// Events carrying a sticky health value alongside their status
    pub fn has_health_status(self) -> bool {
        matches!(self, CameraEvent::MotionDetect | CameraEvent::NoMotion)
    }

    /// Sensor input number (1-based) for alarm input events
    pub fn sensor_input(self) -> Option<u8> {
        match self {
            CameraEvent::Sensor1 => Some(1),
            CameraEvent::Sensor2 => Some(2),
            CameraEvent::Sensor3 => Some(3),
            _ => None,
        }
    }

    pub fn from_sensor_input(input: u8) -> Option<Self> {
        match input {
            1 => Some(CameraEvent::Sensor1),
            2 => Some(CameraEvent::Sensor2),
            3 => Some(CameraEvent::Sensor3),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CameraEvent::MotionDetect => "motion-detect",
            CameraEvent::ViewTamper => "view-tamper",
            CameraEvent::Sensor1 => "sensor-1",
            CameraEvent::Sensor2 => "sensor-2",
            CameraEvent::Sensor3 => "sensor-3",
            CameraEvent::ConnectionFailure => "connection-failure",
            CameraEvent::RecordingFail => "recording-fail",
            CameraEvent::LineCross => "line-cross",
            CameraEvent::Intrusion => "intrusion",
            CameraEvent::AudioException => "audio-exception",
            CameraEvent::MissingObject => "missing-object",
            CameraEvent::SuspiciousObject => "suspicious-object",
            CameraEvent::Loitering => "loitering",
            CameraEvent::CameraOnline => "camera-online",
            CameraEvent::RecordingStart => "recording-start",
            CameraEvent::ObjectCounting => "object-counting",
            CameraEvent::NoMotion => "no-motion",
        }
    }
}

impl std::fmt::Display for CameraEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventState {
    #[default]
    Inactive,
    Active,
}

impl EventState {
    pub fn is_active(self) -> bool {
        self == EventState::Active
    }

    pub fn from_active(active: bool) -> Self {
        if active {
            EventState::Active
        } else {
            EventState::Inactive
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            EventState::Active => EventState::Inactive,
            EventState::Inactive => EventState::Active,
        }
    }
}

/// An `(event, state)` pair decoded from a camera payload
pub type EventReport = (CameraEvent, EventState);
