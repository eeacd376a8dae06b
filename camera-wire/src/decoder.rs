//! Streaming frame splitter for TCP command channels

use bytes::{Buf, BytesMut};

use crate::{Frame, WireError, END_SEQUENCE, SOM};

/// Default upper bound for a buffered, unterminated frame
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Accumulates bytes from a stream and yields complete frames
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_len,
        }
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes waiting for a frame end
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame, if any.
    ///
    /// Garbage before a start marker is discarded. A buffer that grows past
    /// the limit without a frame end is dropped and reported as an error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, WireError> {
        match self.buf.iter().position(|b| *b == SOM) {
            Some(start) => self.buf.advance(start),
            None => {
                self.buf.clear();
                return Ok(None);
            }
        }

        let end = self
            .buf
            .windows(END_SEQUENCE.len())
            .position(|w| w == END_SEQUENCE);

        match end {
            Some(pos) => {
                let frame = self.buf.split_to(pos + END_SEQUENCE.len());
                Frame::parse(&frame).map(Some)
            }
            None if self.buf.len() > self.max_frame_len => {
                self.buf.clear();
                Err(WireError::FrameTooLarge(self.max_frame_len))
            }
            None => Ok(None),
        }
    }

    /// Drain every complete frame currently buffered, skipping malformed ones
    pub fn drain_frames(&mut self) -> Vec<Result<Frame, WireError>> {
        let mut frames = Vec::new();
        loop {
            match self.next_frame() {
                Ok(Some(frame)) => frames.push(Ok(frame)),
                Ok(None) => break,
                Err(e @ WireError::FrameTooLarge(_)) => {
                    frames.push(Err(e));
                    break;
                }
                Err(e) => frames.push(Err(e)),
            }
        }
        frames
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
