//! Brand-dispatched request builders and response parsers for NVR IP cameras
//!
//! This crate knows what each camera brand expects on the wire and how to read
//! what it sends back. It performs no I/O: builders return [`WireRequest`]
//! descriptors and parsers consume [`WireResponse`]s, leaving transport to the
//! caller.
//!
//! ```
//! use camera_api::{build_requests, Brand, BrandRegistry, CameraModel, Operation, StreamType};
//!
//! let registry = BrandRegistry::default();
//! let protocol = registry.lookup(Brand::Hikvision);
//! let requests = build_requests(
//!     protocol.as_ref(),
//!     &CameraModel::new("DS-2CD2143"),
//!     &Operation::GetStreamConfig(StreamType::Main),
//! )
//! .unwrap();
//! assert_eq!(requests[0].describe(), "GET /ISAPI/Streaming/channels/101");
//! ```

pub mod brand;
pub mod brands;
pub mod error;
pub mod event;
pub mod onvif;
pub mod operation;
pub mod request;
pub mod settings;
pub mod stream;
pub mod xml;

pub use brand::{Brand, BrandProtocol, BrandRegistry, CameraModel};
pub use error::{ApiError, Result};
pub use event::{CameraEvent, EventReport, EventState};
pub use operation::{build_requests, parse_response, Operation, OperationKind, OperationOutput};
pub use request::{
    EventPollRequest, HttpMethod, HttpRequest, MultipartBuffer, ResponseShape, WireRequest,
    WireResponse, DEFAULT_MAX_PART_LEN,
};
pub use settings::{
    ImageSettings, MotionWindow, OsdSettings, PrivacyMask, PtzAction, PtzCommand, Region,
};
pub use stream::{
    BitRate, BitRateMode, Resolution, StreamConfig, StreamProfile, StreamType, VideoCodec,
};

// Re-export the framing layer so callers need a single dependency
pub use camera_wire::{Frame, FrameDecoder, WireError};
