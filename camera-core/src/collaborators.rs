//! Services the core consumes from the surrounding recorder
//!
//! Storage, sockets, SOAP and timers live outside this crate. The core reaches
//! them only through these traits, which keeps every state machine testable
//! with in-memory doubles.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use camera_api::onvif::OnvifRequest;
use camera_api::{HttpRequest, StreamConfig, WireRequest};

use crate::error::Result;
use crate::types::{CameraConfig, CameraIndex, EventRecord, IpCameraConfig};

/// Read access to persisted camera configuration
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    fn camera_config(&self, camera: CameraIndex) -> Option<CameraConfig>;

    fn ip_camera_config(&self, camera: CameraIndex) -> Option<IpCameraConfig>;

    fn stream_config(&self, camera: CameraIndex) -> Option<StreamConfig>;
}

/// Identifies one in-flight transport request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u64);

/// What the transport reports back about a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResponse {
    /// Body bytes as they arrive
    Data(Bytes),
    /// The HTTP exchange finished with this status
    Complete { status: u16 },
    /// The request failed; no further callbacks follow
    Error(String),
    /// The peer closed the connection
    Closed,
}

/// Invoked for every transport response of one request
pub type TransportCallback = Arc<dyn Fn(TransportResponse) + Send + Sync>;

/// HTTP and framed TCP access to cameras
pub trait Transport: Send + Sync {
    fn send_http(
        &self,
        camera: &IpCameraConfig,
        request: &HttpRequest,
        callback: TransportCallback,
    ) -> Result<TransportHandle>;

    /// Send encoded frame bytes on the camera's command channel
    fn send_tcp(
        &self,
        camera: &IpCameraConfig,
        frame: Bytes,
        callback: TransportCallback,
    ) -> Result<TransportHandle>;

    /// Abort a request; no callbacks are delivered afterwards
    fn stop(&self, handle: TransportHandle);

    fn send(
        &self,
        camera: &IpCameraConfig,
        request: &WireRequest,
        callback: TransportCallback,
    ) -> Result<TransportHandle> {
        match request {
            WireRequest::Http(http) => self.send_http(camera, http, callback),
            WireRequest::Tcp(frame) => self.send_tcp(camera, frame.encode(), callback),
        }
    }
}

/// Invoked once with the raw SOAP response or a failure description
pub type OnvifCallback = Box<dyn FnOnce(std::result::Result<String, String>) + Send>;

/// SOAP client for ONVIF event services
pub trait OnvifClient: Send + Sync {
    fn start_operation(
        &self,
        camera: &IpCameraConfig,
        request: OnvifRequest,
        callback: OnvifCallback,
    ) -> Result<()>;
}

/// Identifies an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// One-shot timers
pub trait TimerService: Send + Sync {
    fn start(&self, delay: Duration, callback: TimerCallback) -> Result<TimerHandle>;

    /// Cancel a timer; its callback never runs
    fn delete(&self, handle: TimerHandle);

    /// Restart a pending timer with a new delay. Returns false if it already fired.
    fn reload(&self, handle: TimerHandle, delay: Duration) -> bool;
}

/// Destination of normalized event notifications
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Record in the event log and notify network clients
    fn write_event(&self, record: &EventRecord);

    /// Notify network clients only
    fn send_network_event(&self, record: &EventRecord);
}

/// Every service the core needs, bundled for construction
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ConfigStore>,
    pub transport: Arc<dyn Transport>,
    pub onvif: Arc<dyn OnvifClient>,
    pub timers: Arc<dyn TimerService>,
    pub sink: Arc<dyn EventSink>,
}
