//! Single publisher-stream reader.
//!
//! An Image is created when the driver signals a new publisher connection
//! for a subscription and removed when the driver signals disconnection or
//! the owner closes it. Within one Image, fragments are delivered in strict
//! position order: no gaps, no duplicates, no reordering.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::buffer::RegionBuffer;
use crate::frame::{align_frame_length, FrameContext, DATA_FRAME_HEADER_LENGTH};
use crate::stream::StreamRegion;

/// Reader over one ring-buffer-backed stream segment.
///
/// Fragment handlers receive `(buffer, payload_offset, payload_length,
/// frame)` per fragment, borrowed straight from the backing region. A
/// handler error propagates out of the poll untouched; the fragment that
/// was delivered counts as consumed, since position advances on delivery.
pub struct Image {
    subscription_registration_id: i64,
    session_id: i32,
    correlation_id: i64,
    region: Arc<StreamRegion>,
    position: AtomicI64,
    closed: AtomicBool,
}

impl Image {
    pub fn new(
        subscription_registration_id: i64,
        session_id: i32,
        correlation_id: i64,
        region: Arc<StreamRegion>,
    ) -> Self {
        Self {
            subscription_registration_id,
            session_id,
            correlation_id,
            region,
            position: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscription_registration_id(&self) -> i64 {
        self.subscription_registration_id
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    /// Current consumption position in bytes from the stream start.
    /// Monotonic non-decreasing.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.position() >= self.region.end_of_stream_position()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Idempotent. A closed Image polls as empty; the region mapping is
    /// released once the lingering owner drops the last reference.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Read up to `fragment_limit` fragments from the current position.
    /// Non-blocking: returns `Ok(0)` when nothing is available, including
    /// after end-of-stream or close.
    pub fn poll<E, H>(&self, handler: &mut H, fragment_limit: usize) -> Result<usize, E>
    where
        H: FnMut(&Arc<RegionBuffer>, usize, usize, &FrameContext) -> Result<(), E>,
    {
        self.scan(handler, i64::MAX, fragment_limit)
    }

    /// As [`Self::poll`], but never consumes a fragment whose resulting
    /// position would exceed `limit_position`. A fragment ending exactly at
    /// the limit is delivered; one byte over it is not.
    pub fn bounded_poll<E, H>(
        &self,
        handler: &mut H,
        limit_position: i64,
        fragment_limit: usize,
    ) -> Result<usize, E>
    where
        H: FnMut(&Arc<RegionBuffer>, usize, usize, &FrameContext) -> Result<(), E>,
    {
        self.scan(handler, limit_position, fragment_limit)
    }

    fn scan<E, H>(&self, handler: &mut H, limit_position: i64, fragment_limit: usize) -> Result<usize, E>
    where
        H: FnMut(&Arc<RegionBuffer>, usize, usize, &FrameContext) -> Result<(), E>,
    {
        if self.is_closed() {
            return Ok(0);
        }

        let buffer = self.region.buffer();
        let committed = self.region.committed_position();
        let mut position = self.position.load(Ordering::Relaxed);
        let mut fragments_read = 0;

        while fragments_read < fragment_limit && position < committed {
            let frame_offset = position as usize;
            let frame_length = buffer.get_i32(frame_offset + crate::frame::FRAME_LENGTH_OFFSET);
            if frame_length <= 0 {
                // Slot past the writer's progress despite the tail; treat
                // as not yet available rather than corrupt.
                break;
            }

            let next_position = position + align_frame_length(frame_length as usize) as i64;
            if next_position > limit_position {
                break;
            }

            let frame = FrameContext::read(buffer, frame_offset, next_position);
            position = next_position;
            self.position.store(next_position, Ordering::Release);

            if !frame.is_padding() {
                fragments_read += 1;
                handler(
                    buffer,
                    frame_offset + DATA_FRAME_HEADER_LENGTH,
                    frame.payload_length(),
                    &frame,
                )?;
            }
        }

        Ok(fragments_read)
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("session_id", &self.session_id)
            .field("correlation_id", &self.correlation_id)
            .field("position", &self.position())
            .field("closed", &self.is_closed())
            .finish()
    }
}
