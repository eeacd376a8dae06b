//! Error types for the camera-core crate.

use camera_api::ApiError;
use serde::{Deserialize, Serialize};

use crate::types::{CameraIndex, CompositeIndex};

/// Closed set of outcomes reported to callers of the public operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandStatus {
    Success,
    Fail,
    CameraDisconnected,
    FeatureNotSupported,
    ParamNotConfigured,
    ResourceLimit,
    ProcessError,
    /// Caller bug: an index or argument outside the accepted range
    InvalidParameter,
}

impl CommandStatus {
    pub fn is_success(self) -> bool {
        self == CommandStatus::Success
    }
}

/// Errors that can occur in the session manager, event engine and executor.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Index or argument outside the accepted range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Camera is not reachable right now
    #[error("Camera {0} is disconnected")]
    CameraDisconnected(CameraIndex),

    /// Camera has no IP configuration
    #[error("Camera {0} is not configured")]
    ParamNotConfigured(CameraIndex),

    /// A config session for this camera and stream is already running
    #[error("Config session already running for {0}")]
    SessionBusy(CompositeIndex),

    /// Transport or worker capacity exhausted
    #[error("Resource limit: {0}")]
    ResourceLimit(String),

    /// The transport failed to deliver a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response arrived in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Brand dispatch failed to build or parse
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CoreError {
    /// Status reported to callers for this error
    pub fn status(&self) -> CommandStatus {
        match self {
            CoreError::InvalidParameter(_) | CoreError::Configuration(_) => {
                CommandStatus::InvalidParameter
            }
            CoreError::CameraDisconnected(_) => CommandStatus::CameraDisconnected,
            CoreError::ParamNotConfigured(_) => CommandStatus::ParamNotConfigured,
            CoreError::SessionBusy(_) | CoreError::Transport(_) | CoreError::Timeout(_) => {
                CommandStatus::Fail
            }
            CoreError::ResourceLimit(_) => CommandStatus::ResourceLimit,
            CoreError::Api(ApiError::FeatureNotSupported { .. }) => {
                CommandStatus::FeatureNotSupported
            }
            CoreError::Api(ApiError::InvalidParameter(_)) => CommandStatus::InvalidParameter,
            CoreError::Api(ApiError::Rejected(_)) => CommandStatus::Fail,
            CoreError::Api(_) => CommandStatus::ProcessError,
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, CoreError::Api(err) if err.is_not_supported())
    }
}

/// Type alias for results that can return a CoreError
pub type Result<T> = std::result::Result<T, CoreError>;
