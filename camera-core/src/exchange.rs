//! One request, one response: assembling transport callbacks into a
//! complete [`WireResponse`]

use std::sync::Arc;

use bytes::BytesMut;
use camera_api::{FrameDecoder, WireRequest, WireResponse};
use parking_lot::Mutex;
use tracing::trace;

use crate::collaborators::{Transport, TransportCallback, TransportHandle, TransportResponse};
use crate::error::{CoreError, Result};
use crate::types::IpCameraConfig;

pub(crate) type CompletionCallback = Box<dyn FnOnce(Result<WireResponse>) + Send>;

enum Body {
    Http(BytesMut),
    Tcp(FrameDecoder),
}

struct Assembly {
    body: Body,
    on_complete: Option<CompletionCallback>,
}

impl Assembly {
    /// Feed one transport callback; returns the outcome once the response is whole
    fn feed(&mut self, response: TransportResponse) -> Option<Result<WireResponse>> {
        match (response, &mut self.body) {
            (TransportResponse::Data(data), Body::Http(body)) => {
                body.extend_from_slice(&data);
                None
            }
            (TransportResponse::Data(data), Body::Tcp(decoder)) => {
                decoder.extend(&data);
                match decoder.next_frame() {
                    Ok(Some(frame)) => Some(Ok(WireResponse::Frame(frame))),
                    Ok(None) => None,
                    Err(e) => Some(Err(CoreError::Api(e.into()))),
                }
            }
            (TransportResponse::Complete { status }, Body::Http(body)) => {
                let body = String::from_utf8_lossy(&body[..]).into_owned();
                Some(Ok(WireResponse::Http { status, body }))
            }
            (TransportResponse::Complete { .. }, Body::Tcp(_)) | (TransportResponse::Closed, _) => {
                Some(Err(CoreError::Transport(
                    "connection closed before a complete response".to_string(),
                )))
            }
            (TransportResponse::Error(e), _) => Some(Err(CoreError::Transport(e))),
        }
    }
}

/// Send `request` and call `on_complete` exactly once with its response
///
/// HTTP bodies are collected until the exchange completes; on the command
/// channel the first complete frame is the reply.
pub(crate) fn send_request(
    transport: &dyn Transport,
    camera: &IpCameraConfig,
    request: &WireRequest,
    on_complete: CompletionCallback,
) -> Result<TransportHandle> {
    let body = match request {
        WireRequest::Http(_) => Body::Http(BytesMut::new()),
        WireRequest::Tcp(_) => Body::Tcp(FrameDecoder::new()),
    };
    let assembly = Arc::new(Mutex::new(Assembly {
        body,
        on_complete: Some(on_complete),
    }));

    let label = request.describe();
    let callback: TransportCallback = Arc::new(move |response: TransportResponse| {
        let finished = {
            let mut assembly = assembly.lock();
            if assembly.on_complete.is_none() {
                return;
            }
            match assembly.feed(response) {
                Some(outcome) => assembly.on_complete.take().map(|done| (done, outcome)),
                None => None,
            }
        };
        if let Some((done, outcome)) = finished {
            trace!(request = %label, ok = outcome.is_ok(), "Response complete");
            done(outcome);
        }
    });

    transport.send(camera, request, callback)
}
