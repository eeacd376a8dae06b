//! Generic operations and their dispatch onto a brand's protocol table

use serde::{Deserialize, Serialize};

use crate::brand::{BrandProtocol, CameraModel};
use crate::error::{ApiError, Result};
use crate::request::{WireRequest, WireResponse};
use crate::settings::{ImageSettings, MotionWindow, OsdSettings, PrivacyMask, PtzCommand};
use crate::stream::{StreamProfile, StreamType};

/// Named operation slots of a brand table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    GetStreamConfig,
    SetStreamConfig,
    GetImageSettings,
    SetImageSettings,
    SetOsd,
    GetMotionWindow,
    SetMotionWindow,
    GetPrivacyMask,
    SetPrivacyMask,
    SetPtz,
    GetEventUrl,
}

impl OperationKind {
    /// Whether the operation reads configuration from the camera
    pub fn is_config_fetch(self) -> bool {
        matches!(
            self,
            OperationKind::GetStreamConfig
                | OperationKind::GetImageSettings
                | OperationKind::GetMotionWindow
                | OperationKind::GetPrivacyMask
        )
    }
}

/// An operation together with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    GetStreamConfig(StreamType),
    SetStreamConfig(StreamType, StreamProfile),
    GetImageSettings,
    SetImageSettings(ImageSettings),
    SetOsd(OsdSettings),
    GetMotionWindow,
    SetMotionWindow(MotionWindow),
    GetPrivacyMask,
    SetPrivacyMask(PrivacyMask),
    SetPtz(PtzCommand),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::GetStreamConfig(_) => OperationKind::GetStreamConfig,
            Operation::SetStreamConfig(..) => OperationKind::SetStreamConfig,
            Operation::GetImageSettings => OperationKind::GetImageSettings,
            Operation::SetImageSettings(_) => OperationKind::SetImageSettings,
            Operation::SetOsd(_) => OperationKind::SetOsd,
            Operation::GetMotionWindow => OperationKind::GetMotionWindow,
            Operation::SetMotionWindow(_) => OperationKind::SetMotionWindow,
            Operation::GetPrivacyMask => OperationKind::GetPrivacyMask,
            Operation::SetPrivacyMask(_) => OperationKind::SetPrivacyMask,
            Operation::SetPtz(_) => OperationKind::SetPtz,
        }
    }

    /// Check arguments before anything is built or sent
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::SetStreamConfig(_, profile) => profile.validate(),
            Operation::SetImageSettings(settings) => settings.validate(),
            Operation::SetOsd(osd) => osd.validate(),
            Operation::SetMotionWindow(window) => window.validate(),
            Operation::SetPrivacyMask(mask) => mask.validate(),
            Operation::SetPtz(command) => command.validate(),
            Operation::GetStreamConfig(_)
            | Operation::GetImageSettings
            | Operation::GetMotionWindow
            | Operation::GetPrivacyMask => Ok(()),
        }
    }
}

/// Normalized result of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutput {
    /// A set-style operation was acknowledged
    Done,
    StreamProfile(StreamProfile),
    ImageSettings(ImageSettings),
    MotionWindow(MotionWindow),
    PrivacyMask(PrivacyMask),
}

/// Build the wire requests for `operation`, in sending order
pub fn build_requests(
    protocol: &dyn BrandProtocol,
    model: &CameraModel,
    operation: &Operation,
) -> Result<Vec<WireRequest>> {
    operation.validate()?;
    let requests = match operation {
        Operation::GetStreamConfig(stream) => protocol.build_get_stream(model, *stream)?,
        Operation::SetStreamConfig(stream, profile) => {
            protocol.build_set_stream(model, *stream, profile)?
        }
        Operation::GetImageSettings => protocol.build_get_image(model)?,
        Operation::SetImageSettings(settings) => protocol.build_set_image(model, settings)?,
        Operation::SetOsd(osd) => protocol.build_set_osd(model, osd)?,
        Operation::GetMotionWindow => protocol.build_get_motion_window(model)?,
        Operation::SetMotionWindow(window) => protocol.build_set_motion_window(model, window)?,
        Operation::GetPrivacyMask => protocol.build_get_privacy_mask(model)?,
        Operation::SetPrivacyMask(mask) => protocol.build_set_privacy_mask(model, mask)?,
        Operation::SetPtz(command) => protocol.build_set_ptz(model, command)?,
    };
    if requests.is_empty() {
        return Err(ApiError::not_supported(protocol.brand(), operation.kind()));
    }
    Ok(requests)
}

/// Interpret the response to the final request of `operation`
pub fn parse_response(
    protocol: &dyn BrandProtocol,
    model: &CameraModel,
    operation: &Operation,
    response: &WireResponse,
) -> Result<OperationOutput> {
    match operation {
        Operation::GetStreamConfig(stream) => {
            let mut profile = match stream {
                StreamType::Main => StreamProfile::main_defaults(),
                StreamType::Sub => StreamProfile::sub_defaults(),
            };
            protocol.parse_stream(model, *stream, response, &mut profile)?;
            Ok(OperationOutput::StreamProfile(profile))
        }
        Operation::GetImageSettings => protocol
            .parse_image(model, response)
            .map(OperationOutput::ImageSettings),
        Operation::GetMotionWindow => protocol
            .parse_motion_window(model, response)
            .map(OperationOutput::MotionWindow),
        Operation::GetPrivacyMask => protocol
            .parse_privacy_mask(model, response)
            .map(OperationOutput::PrivacyMask),
        Operation::SetStreamConfig(..)
        | Operation::SetImageSettings(_)
        | Operation::SetOsd(_)
        | Operation::SetMotionWindow(_)
        | Operation::SetPrivacyMask(_)
        | Operation::SetPtz(_) => protocol
            .check_ack(model, response)
            .map(|_| OperationOutput::Done),
    }
}
