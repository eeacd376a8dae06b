//! Per camera event request state: open streams, in-flight polls and the
//! ONVIF subscription

use camera_api::{
    ApiError, CameraEvent, EventPollRequest, FrameDecoder, MultipartBuffer, ResponseShape,
    WireRequest, WireResponse,
};

use bytes::BytesMut;

use super::onvif::OnvifSubscription;
use crate::collaborators::{TimerHandle, TransportHandle};

/// The long-lived connection of a multi-part brand
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    /// Request that opened the stream; `Some` while the stream is wanted
    pub poll: Option<EventPollRequest>,
    pub generation: u64,
    pub handle: Option<TransportHandle>,
    pub retry: Option<TimerHandle>,
}

impl StreamState {
    pub fn is_open(&self) -> bool {
        self.poll.is_some()
    }
}

/// One event of a single-part brand
#[derive(Debug)]
pub(crate) struct SinglePoll {
    pub request: WireRequest,
    pub generation: u64,
    pub handle: Option<TransportHandle>,
    pub timer: Option<TimerHandle>,
}

#[derive(Debug)]
pub(crate) struct RequestState {
    pub shape: Option<ResponseShape>,
    pub stream: StreamState,
    pub single: [Option<SinglePoll>; CameraEvent::COUNT],
    pub onvif: OnvifSubscription,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            shape: None,
            stream: StreamState::default(),
            single: std::array::from_fn(|_| None),
            onvif: OnvifSubscription::default(),
        }
    }
}

impl RequestState {
    pub fn single_matches(&self, event: CameraEvent, generation: u64) -> bool {
        self.single[event.index()]
            .as_ref()
            .is_some_and(|poll| poll.generation == generation)
    }

    pub fn single_mut(&mut self, event: CameraEvent, generation: u64) -> Option<&mut SinglePoll> {
        self.single[event.index()]
            .as_mut()
            .filter(|poll| poll.generation == generation)
    }

    /// Clear the shape once nothing is left in flight
    pub fn settle_shape(&mut self) {
        let idle = !self.stream.is_open()
            && self.single.iter().all(Option::is_none)
            && !self.onvif.is_active();
        if idle {
            self.shape = None;
        }
    }
}

/// Splits a multi-part event stream into complete payloads
pub(crate) enum StreamDecoder {
    /// Framed command channel
    Frames(FrameDecoder),
    /// `multipart/x-mixed-replace` HTTP body
    Parts(MultipartBuffer),
    /// HTTP stream without a boundary; every chunk is one payload. Holds the
    /// bytes of a character cut off at the end of the previous chunk.
    Chunks(BytesMut),
}

impl StreamDecoder {
    pub fn for_request(poll: &EventPollRequest) -> Self {
        match (&poll.request, poll.boundary.as_deref()) {
            (WireRequest::Tcp(_), _) => StreamDecoder::Frames(FrameDecoder::new()),
            (WireRequest::Http(_), Some(boundary)) => {
                StreamDecoder::Parts(MultipartBuffer::new(boundary))
            }
            (WireRequest::Http(_), None) => StreamDecoder::Chunks(BytesMut::new()),
        }
    }

    pub fn push(&mut self, data: &[u8]) -> Vec<Result<WireResponse, ApiError>> {
        match self {
            StreamDecoder::Frames(decoder) => {
                decoder.extend(data);
                decoder
                    .drain_frames()
                    .into_iter()
                    .map(|frame| frame.map(WireResponse::Frame).map_err(ApiError::from))
                    .collect()
            }
            StreamDecoder::Parts(buffer) => buffer
                .push(data)
                .into_iter()
                .map(|body| body.map(|body| WireResponse::http(200, body)))
                .collect(),
            StreamDecoder::Chunks(pending) => {
                pending.extend_from_slice(data);
                let complete = match std::str::from_utf8(pending) {
                    Err(e) if e.error_len().is_none() => e.valid_up_to(),
                    _ => pending.len(),
                };
                if complete == 0 {
                    return Vec::new();
                }
                let chunk = pending.split_to(complete);
                vec![Ok(WireResponse::http(200, String::from_utf8_lossy(&chunk)))]
            }
        }
    }
}
