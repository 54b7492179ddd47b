//! Incremental decoding of one peer's byte stream.
//!
//! TCP delivers bytes in arbitrary chunks: a frame may span several reads,
//! and one read may carry the end of the upgrade request plus the first
//! frames.  [`FrameReader`] accumulates bytes across reads and only hands out
//! complete request heads and complete frames.
//!
//! Frames whose declared payload exceeds the limit are never buffered.  Their
//! bytes are discarded as they arrive, so the reader stays aligned on the next
//! frame header.

use crate::protocol::frame::{decode_frame, decode_header, Frame, FrameError};
use crate::protocol::handshake::request_head_len;

/// Receive buffer for a single connection.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    /// Bytes of an oversized frame that have not arrived yet and must be dropped.
    skip: u64,
    max_payload: usize,
}

impl FrameReader {
    pub fn new(max_payload: usize) -> Self {
        Self {
            buffer: Vec::new(),
            skip: 0,
            max_payload,
        }
    }

    /// Bytes held but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// `true` while the tail of an oversized frame is still being discarded.
    pub fn is_skipping(&self) -> bool {
        self.skip > 0
    }

    /// Appends one read's worth of bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        let dropped = usize::try_from(self.skip).map_or(bytes.len(), |skip| skip.min(bytes.len()));
        self.skip -= dropped as u64;
        self.buffer.extend_from_slice(&bytes[dropped..]);
    }

    /// Removes and returns the HTTP request head once its blank line has arrived.
    ///
    /// Bytes after the blank line stay buffered for [`FrameReader::next_frame`].
    pub fn take_request_head(&mut self) -> Option<Vec<u8>> {
        let end = request_head_len(&self.buffer)?;
        Some(self.buffer.drain(..end).collect())
    }

    /// Removes and returns the next complete frame.
    ///
    /// `Ok(None)` means more bytes are needed.
    ///
    /// # Errors
    ///
    /// - [`FrameError::TooLarge`]: the frame is discarded (including bytes
    ///   still to come) and decoding resumes at the following frame.
    /// - [`FrameError::LengthOverflow`]: the frame boundary is unknowable, so
    ///   everything buffered is discarded.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let header = match decode_header(&self.buffer) {
            Ok(header) => header,
            Err(FrameError::InsufficientData { .. }) => return Ok(None),
            Err(e) => {
                self.buffer.clear();
                return Err(e);
            }
        };

        if header.payload_len > self.max_payload as u64 {
            let total = header.frame_len();
            let dropped = usize::try_from(total).map_or(self.buffer.len(), |t| t.min(self.buffer.len()));
            self.buffer.drain(..dropped);
            self.skip = total - dropped as u64;
            return Err(FrameError::TooLarge {
                declared: header.payload_len,
                max: self.max_payload,
            });
        }

        match decode_frame(&self.buffer) {
            Ok((frame, used)) => {
                self.buffer.drain(..used);
                Ok(Some(frame))
            }
            Err(FrameError::Truncated { .. }) => Ok(None),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }
}
