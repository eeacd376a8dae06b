//! Transport-neutral request and response descriptors
//!
//! Brands never perform I/O. They describe what to send as [`WireRequest`]s and
//! interpret what came back from a [`WireResponse`]; the transport layer moves
//! the bytes.

use bytes::{Buf, BytesMut};
use camera_wire::{Frame, WireError};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::event::CameraEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path and query, e.g. `/cgi-bin/configManager.cgi?action=getConfig&name=Encode`
    pub path: String,
    pub content_type: Option<&'static str>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            content_type: None,
            body: None,
        }
    }

    pub fn put_xml(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Put,
            path: path.into(),
            content_type: Some("application/xml"),
            body: Some(body.into()),
        }
    }
}

/// One request to put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireRequest {
    Http(HttpRequest),
    Tcp(Frame),
}

impl WireRequest {
    pub fn is_http(&self) -> bool {
        matches!(self, WireRequest::Http(_))
    }

    /// Short label for log lines
    pub fn describe(&self) -> String {
        match self {
            WireRequest::Http(req) => format!("{} {}", req.method.as_str(), req.path),
            WireRequest::Tcp(frame) => format!("TCP {}", frame.header()),
        }
    }
}

/// A complete response unit handed to a parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireResponse {
    Http { status: u16, body: String },
    Frame(Frame),
}

impl WireResponse {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        WireResponse::Http {
            status,
            body: body.into(),
        }
    }
}

/// How a brand delivers event notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseShape {
    /// One long-lived connection reporting every event
    MultiPart,
    /// One short request per event, re-sent on an interval
    SinglePart,
    /// ONVIF pull-point subscription
    Onvif,
}

/// Request that starts event delivery for one event (or all of them)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPollRequest {
    pub request: WireRequest,
    pub shape: ResponseShape,
    /// MIME boundary of a multi-part HTTP stream
    pub boundary: Option<String>,
    /// Event a single-part request polls
    pub event: Option<CameraEvent>,
}

impl EventPollRequest {
    pub fn multi_part(request: WireRequest, boundary: Option<&str>) -> Self {
        Self {
            request,
            shape: ResponseShape::MultiPart,
            boundary: boundary.map(str::to_string),
            event: None,
        }
    }

    pub fn single_part(request: WireRequest, event: CameraEvent) -> Self {
        Self {
            request,
            shape: ResponseShape::SinglePart,
            boundary: None,
            event: Some(event),
        }
    }
}

/// Default upper bound for one buffered, unterminated part
pub const DEFAULT_MAX_PART_LEN: usize = 256 * 1024;

/// Splits a `multipart/x-mixed-replace` byte stream into part bodies
///
/// Chunks can break anywhere, including inside a boundary marker or a
/// multi-byte character; incomplete trailing bytes stay buffered until the
/// next boundary arrives. Text is decoded only once a part is complete.
#[derive(Debug)]
pub struct MultipartBuffer {
    marker: Vec<u8>,
    buf: BytesMut,
    max_part_len: usize,
}

impl MultipartBuffer {
    pub fn new(boundary: &str) -> Self {
        Self::with_max_part_len(boundary, DEFAULT_MAX_PART_LEN)
    }

    pub fn with_max_part_len(boundary: &str, max_part_len: usize) -> Self {
        Self {
            marker: format!("--{}", boundary.trim_start_matches("--")).into_bytes(),
            buf: BytesMut::new(),
            max_part_len,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append a chunk and return the bodies of every part it completed.
    ///
    /// A part that grows past the limit without a closing boundary is dropped
    /// and reported as an error; decoding resumes at the next boundary.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, ApiError>> {
        self.buf.extend_from_slice(chunk);

        let mut parts = Vec::new();
        loop {
            let Some(start) = find(&self.buf, &self.marker) else {
                // Keep only a tail that might be the start of a marker
                let keep = self.marker.len().saturating_sub(1);
                if self.buf.len() > keep {
                    self.buf.advance(self.buf.len() - keep);
                }
                break;
            };
            let body_start = start + self.marker.len();
            let Some(next) = find(&self.buf[body_start..], &self.marker) else {
                self.buf.advance(start);
                if self.buf.len() > self.max_part_len {
                    self.buf.advance(self.marker.len());
                    parts.push(Err(WireError::FrameTooLarge(self.max_part_len).into()));
                    continue;
                }
                break;
            };
            let part = self.buf.split_to(body_start + next);
            if let Some(body) = Self::part_body(&String::from_utf8_lossy(&part[self.marker.len()..])) {
                parts.push(Ok(body));
            }
        }
        parts
    }

    fn part_body(part: &str) -> Option<String> {
        let body = match part.find("\r\n\r\n") {
            Some(pos) => &part[pos + 4..],
            None => part.split_once("\n\n").map_or(part, |(_, b)| b),
        };
        let body = body.trim();
        (!body.is_empty()).then(|| body.to_string())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
