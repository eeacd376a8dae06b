use camera_wire::WireError;
use thiserror::Error;

use crate::brand::Brand;
use crate::operation::OperationKind;

/// Errors produced while building requests or parsing camera responses
///
/// `FeatureNotSupported` is terminal for a camera: the brand (or this model
/// of it) has no implementation of the operation, and retrying will not help.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The brand or model has no implementation of the operation
    #[error("{operation:?} is not supported by {brand:?}")]
    FeatureNotSupported {
        brand: Brand,
        operation: OperationKind,
    },

    /// An operation argument is outside what the camera accepts
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The response could not be interpreted
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The camera answered but rejected the command
    #[error("Camera rejected command with status {0}")]
    Rejected(u16),

    /// SOAP fault returned by an ONVIF service
    #[error("SOAP fault: {0}")]
    Fault(String),

    /// Framed command-channel error
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
}

impl ApiError {
    pub fn not_supported(brand: Brand, operation: OperationKind) -> Self {
        Self::FeatureNotSupported { brand, operation }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::FeatureNotSupported { .. })
    }
}

impl From<xmltree::ParseError> for ApiError {
    fn from(error: xmltree::ParseError) -> Self {
        ApiError::ParseError(error.to_string())
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;
