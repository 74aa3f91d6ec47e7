//! Outbound single-stream writer.
//!
//! The offer contract mirrors the inbound side's position arithmetic: a
//! successful offer returns the stream position after the framed fragment,
//! and failures come back as negative sentinels so callers can apply their
//! own backpressure policy. Nothing here blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::RegionBuffer;
use crate::frame::FRAME_TYPE_DATA;
use crate::stream::StreamRegion;

/// Not connected to a subscriber.
pub const NOT_CONNECTED: i64 = -1;
/// The stream segment cannot accept the fragment right now.
pub const BACK_PRESSURED: i64 = -2;
/// The publication has been closed.
pub const PUBLICATION_CLOSED: i64 = -4;

/// Computes the reserved 64-bit value embedded in a frame at send time,
/// once the payload bytes are in place. Used for sequencing/correlation.
pub type ReservedValueSupplier<'a> = &'a mut dyn FnMut(&RegionBuffer, usize, usize) -> i64;

pub struct Publication {
    channel: String,
    stream_id: i32,
    session_id: i32,
    registration_id: i64,
    region: Arc<StreamRegion>,
    closed: AtomicBool,
}

impl Publication {
    pub fn new(
        channel: impl Into<String>,
        registration_id: i64,
        stream_id: i32,
        session_id: i32,
        region: Arc<StreamRegion>,
    ) -> Self {
        Self {
            channel: channel.into(),
            stream_id,
            session_id,
            registration_id,
            region,
            closed: AtomicBool::new(false),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    pub fn position(&self) -> i64 {
        self.region.committed_position()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Offer `length` bytes starting at `offset` in `buffer`. Returns the
    /// resulting stream position, or a negative sentinel. The supplier is
    /// invoked exactly once per accepted frame.
    pub fn offer(
        &self,
        buffer: &RegionBuffer,
        offset: usize,
        length: usize,
        reserved_value_supplier: ReservedValueSupplier<'_>,
    ) -> i64 {
        if self.is_closed() {
            return PUBLICATION_CLOSED;
        }

        let payload = buffer.get_bytes(offset, length);
        match self.region.append_with(
            FRAME_TYPE_DATA,
            self.session_id,
            self.stream_id,
            &payload,
            |region_buffer, payload_offset| {
                reserved_value_supplier(region_buffer, payload_offset, length)
            },
        ) {
            Some(position) => position,
            None => BACK_PRESSURED,
        }
    }
}

impl std::fmt::Debug for Publication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publication")
            .field("channel", &self.channel)
            .field("stream_id", &self.stream_id)
            .field("session_id", &self.session_id)
            .field("position", &self.position())
            .finish()
    }
}
