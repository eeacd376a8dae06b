//! Brand protocol tables

mod dahua;
mod generic;
mod hikvision;
mod matrix;

pub use dahua::DahuaProtocol;
pub use generic::GenericProtocol;
pub use hikvision::HikvisionProtocol;
pub use matrix::MatrixProtocol;

use camera_wire::{Frame, REPLY_SUCCESS};

use crate::error::{ApiError, Result};
use crate::request::WireResponse;

/// Reply frame to `command`, checked for a success status
pub(crate) fn expect_reply<'a>(response: &'a WireResponse, command: &str) -> Result<&'a Frame> {
    let WireResponse::Frame(frame) = response else {
        return Err(ApiError::ParseError(format!(
            "expected framed reply to {command}, got HTTP"
        )));
    };
    if !frame.is_reply_to(command) {
        return Err(ApiError::ParseError(format!(
            "expected reply to {command}, got {}",
            frame.header()
        )));
    }
    match frame.reply_code()? {
        REPLY_SUCCESS => Ok(frame),
        code => Err(ApiError::Rejected(code)),
    }
}

/// Body of a successful HTTP response
pub(crate) fn expect_http_body(response: &WireResponse) -> Result<&str> {
    match response {
        WireResponse::Http { status, body } if (200..300).contains(status) => Ok(body),
        WireResponse::Http { status, .. } => Err(ApiError::Rejected(*status)),
        WireResponse::Frame(frame) => Err(ApiError::ParseError(format!(
            "expected HTTP response, got frame {}",
            frame.header()
        ))),
    }
}

pub(crate) fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(ApiError::ParseError(format!("expected a flag, got '{other}'"))),
    }
}

pub(crate) fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::ParseError(format!("{name}: unexpected value '{raw}'")))
}
