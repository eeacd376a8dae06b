//! Error types for the command-channel codec

use thiserror::Error;

/// Errors that can occur while encoding or decoding command frames
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Frame did not start with the start-of-message marker
    #[error("Frame is missing the start-of-message marker")]
    MissingStart,

    /// Frame did not end with the end-of-item/transaction/message sequence
    #[error("Frame is missing the end-of-message sequence")]
    MissingEnd,

    /// Header was empty or contained a control byte
    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),

    /// A field id could not be parsed
    #[error("Invalid field id: {0}")]
    InvalidFieldId(String),

    /// Fields were pushed out of ascending numeric order
    #[error("Field {id} emitted after field {previous}")]
    FieldOrder { id: u16, previous: u16 },

    /// A value contained a reserved control byte
    #[error("Field {id} value contains a reserved control byte")]
    InvalidValue { id: u16 },

    /// A required field was absent
    #[error("Missing field {0}")]
    MissingField(u16),

    /// A field was present but did not parse as the expected type
    #[error("Field {id} has unexpected value '{value}'")]
    UnexpectedValue { id: u16, value: String },

    /// The decoder buffered more bytes than allowed without seeing a frame end
    #[error("Frame exceeds {0} bytes")]
    FrameTooLarge(usize),
}
