//! Brand identification and the per-brand protocol table

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::brands::{DahuaProtocol, GenericProtocol, HikvisionProtocol, MatrixProtocol};
use crate::error::{ApiError, Result};
use crate::event::{CameraEvent, EventReport};
use crate::operation::OperationKind;
use crate::request::{EventPollRequest, WireRequest, WireResponse};
use crate::settings::{ImageSettings, MotionWindow, OsdSettings, PrivacyMask, PtzCommand};
use crate::stream::{StreamProfile, StreamType};

/// Camera manufacturer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Brand {
    /// Streaming-only camera with no vendor control protocol
    #[default]
    Generic,
    Matrix,
    Hikvision,
    Dahua,
}

impl Brand {
    pub const ALL: [Brand; 4] = [Brand::Generic, Brand::Matrix, Brand::Hikvision, Brand::Dahua];

    pub fn as_str(self) -> &'static str {
        match self {
            Brand::Generic => "generic",
            Brand::Matrix => "matrix",
            Brand::Hikvision => "hikvision",
            Brand::Dahua => "dahua",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Brand {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "generic" | "onvif" => Ok(Brand::Generic),
            "matrix" => Ok(Brand::Matrix),
            "hikvision" | "hik" => Ok(Brand::Hikvision),
            "dahua" => Ok(Brand::Dahua),
            other => Err(ApiError::InvalidParameter(format!("unknown brand '{other}'"))),
        }
    }
}

/// Model of a camera within its brand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraModel {
    name: String,
    ptz: bool,
}

impl CameraModel {
    /// Models advertise pan/tilt/zoom in their name unless overridden
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let ptz = name.to_ascii_uppercase().contains("PTZ");
        Self { name, ptz }
    }

    pub fn with_ptz(mut self, ptz: bool) -> Self {
        self.ptz = ptz;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_ptz(&self) -> bool {
        self.ptz
    }
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::new("generic")
    }
}

/// Per-brand table of request builders and response parsers
///
/// Every slot has a default that reports [`ApiError::FeatureNotSupported`], so
/// a brand only overrides what it actually implements. Builders never touch
/// the network; an unsupported slot therefore costs zero wire bytes.
pub trait BrandProtocol: Send + Sync + fmt::Debug {
    fn brand(&self) -> Brand;

    fn unsupported<T>(&self, operation: OperationKind) -> Result<T>
    where
        Self: Sized,
    {
        Err(ApiError::not_supported(self.brand(), operation))
    }

    fn build_get_stream(&self, _model: &CameraModel, _stream: StreamType) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetStreamConfig))
    }

    /// Merge the fields present in `response` into `profile`
    fn parse_stream(
        &self,
        _model: &CameraModel,
        _stream: StreamType,
        _response: &WireResponse,
        _profile: &mut StreamProfile,
    ) -> Result<()> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetStreamConfig))
    }

    fn build_set_stream(
        &self,
        _model: &CameraModel,
        _stream: StreamType,
        _profile: &StreamProfile,
    ) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::SetStreamConfig))
    }

    fn build_get_image(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetImageSettings))
    }

    fn parse_image(&self, _model: &CameraModel, _response: &WireResponse) -> Result<ImageSettings> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetImageSettings))
    }

    fn build_set_image(&self, _model: &CameraModel, _settings: &ImageSettings) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::SetImageSettings))
    }

    fn build_set_osd(&self, _model: &CameraModel, _osd: &OsdSettings) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::SetOsd))
    }

    fn build_get_motion_window(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetMotionWindow))
    }

    fn parse_motion_window(&self, _model: &CameraModel, _response: &WireResponse) -> Result<MotionWindow> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetMotionWindow))
    }

    fn build_set_motion_window(&self, _model: &CameraModel, _window: &MotionWindow) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::SetMotionWindow))
    }

    fn build_get_privacy_mask(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetPrivacyMask))
    }

    fn parse_privacy_mask(&self, _model: &CameraModel, _response: &WireResponse) -> Result<PrivacyMask> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetPrivacyMask))
    }

    fn build_set_privacy_mask(&self, _model: &CameraModel, _mask: &PrivacyMask) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::SetPrivacyMask))
    }

    fn build_set_ptz(&self, _model: &CameraModel, _command: &PtzCommand) -> Result<Vec<WireRequest>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::SetPtz))
    }

    /// Request that starts delivery of `event`
    ///
    /// Multi-part brands return the same request for every event.
    fn event_request(&self, _model: &CameraModel, _event: CameraEvent) -> Result<EventPollRequest> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetEventUrl))
    }

    /// Decode one complete event payload (a frame, a part, or a poll body)
    ///
    /// `polled` is the event a single-part request asked about; single-part
    /// bodies do not name it themselves.
    fn parse_events(
        &self,
        _model: &CameraModel,
        _polled: Option<CameraEvent>,
        _response: &WireResponse,
    ) -> Result<Vec<EventReport>> {
        Err(ApiError::not_supported(self.brand(), OperationKind::GetEventUrl))
    }

    /// Check the acknowledgement of a set-style request
    fn check_ack(&self, _model: &CameraModel, response: &WireResponse) -> Result<()> {
        match response {
            WireResponse::Http { status, .. } if (200..300).contains(status) => Ok(()),
            WireResponse::Http { status, .. } => Err(ApiError::Rejected(*status)),
            WireResponse::Frame(frame) => match frame.reply_code()? {
                camera_wire::REPLY_SUCCESS => Ok(()),
                code => Err(ApiError::Rejected(code)),
            },
        }
    }
}

/// Brand → protocol table lookup, immutable once built
#[derive(Debug, Clone)]
pub struct BrandRegistry {
    tables: HashMap<Brand, Arc<dyn BrandProtocol>>,
    generic: Arc<dyn BrandProtocol>,
}

impl BrandRegistry {
    /// Registry with only the empty generic table
    pub fn empty() -> Self {
        Self {
            tables: HashMap::new(),
            generic: Arc::new(GenericProtocol),
        }
    }

    pub fn with_protocol(mut self, protocol: Arc<dyn BrandProtocol>) -> Self {
        self.tables.insert(protocol.brand(), protocol);
        self
    }

    /// Look up the table for `brand`; unknown brands resolve to the generic table
    pub fn lookup(&self, brand: Brand) -> Arc<dyn BrandProtocol> {
        match brand {
            Brand::Generic => Arc::clone(&self.generic),
            _ => self
                .tables
                .get(&brand)
                .cloned()
                .unwrap_or_else(|| Arc::clone(&self.generic)),
        }
    }

    pub fn supports(&self, brand: Brand) -> bool {
        brand != Brand::Generic && self.tables.contains_key(&brand)
    }
}

impl Default for BrandRegistry {
    fn default() -> Self {
        Self::empty()
            .with_protocol(Arc::new(MatrixProtocol))
            .with_protocol(Arc::new(HikvisionProtocol))
            .with_protocol(Arc::new(DahuaProtocol))
    }
}
