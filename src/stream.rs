//! One publisher stream's pre-established memory segment.
//!
//! The writer side appends a frame, then publishes the new tail with a
//! Release store; pollers Acquire-load the tail and never read past it.
//! That pairing is the only cross-thread ordering the data bytes rely on.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::buffer::RegionBuffer;
use crate::frame::{align_frame_length, write_frame_header, FRAME_TYPE_DATA};

/// Shared state of one stream segment: the data region, the committed tail
/// (bytes readable from the segment start) and the end-of-stream position
/// (`i64::MAX` until the publisher marks the stream finished).
pub struct StreamRegion {
    buffer: Arc<RegionBuffer>,
    tail: AtomicI64,
    eos_position: AtomicI64,
}

impl StreamRegion {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(RegionBuffer::new(capacity)),
            tail: AtomicI64::new(0),
            eos_position: AtomicI64::new(i64::MAX),
        }
    }

    pub fn buffer(&self) -> &Arc<RegionBuffer> {
        &self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Committed byte count; fragments at offsets below this are readable.
    pub fn committed_position(&self) -> i64 {
        self.tail.load(Ordering::Acquire)
    }

    pub fn end_of_stream_position(&self) -> i64 {
        self.eos_position.load(Ordering::Acquire)
    }

    /// Append one framed fragment. Returns the stream position after the
    /// aligned frame, or `None` when the segment lacks space for it.
    pub fn append(
        &self,
        frame_type: u16,
        session_id: i32,
        stream_id: i32,
        payload: &[u8],
    ) -> Option<i64> {
        self.append_with(frame_type, session_id, stream_id, payload, |_, _| 0)
    }

    /// As [`Self::append`], with a caller-supplied function computing the
    /// frame's reserved value once the payload bytes are in place.
    pub fn append_with(
        &self,
        frame_type: u16,
        session_id: i32,
        stream_id: i32,
        payload: &[u8],
        reserved_value: impl FnOnce(&RegionBuffer, usize) -> i64,
    ) -> Option<i64> {
        let tail = self.tail.load(Ordering::Relaxed);
        let frame_offset = tail as usize;
        let frame_length = crate::frame::DATA_FRAME_HEADER_LENGTH + payload.len();
        let aligned = align_frame_length(frame_length);
        if frame_offset + aligned > self.buffer.capacity() {
            return None;
        }

        let payload_offset = frame_offset + crate::frame::DATA_FRAME_HEADER_LENGTH;
        self.buffer.put_bytes(payload_offset, payload);
        write_frame_header(
            &self.buffer,
            frame_offset,
            frame_type,
            session_id,
            stream_id,
            payload.len(),
        );
        let value = reserved_value(&self.buffer, payload_offset);
        self.buffer
            .put_i64(frame_offset + crate::frame::RESERVED_VALUE_OFFSET, value);

        let new_tail = tail + aligned as i64;
        self.tail.store(new_tail, Ordering::Release);
        Some(new_tail)
    }

    /// Convenience for test drivers and the outbound path: append a DATA
    /// frame with session/stream ids already known to the region's owner.
    pub fn append_data(&self, session_id: i32, stream_id: i32, payload: &[u8]) -> Option<i64> {
        self.append(FRAME_TYPE_DATA, session_id, stream_id, payload)
    }

    /// Mark the stream finished at the current tail. Pollers that reach
    /// this position observe end-of-stream.
    pub fn mark_end_of_stream(&self) {
        let tail = self.tail.load(Ordering::Acquire);
        self.eos_position.store(tail, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_advances_tail_by_aligned_length() {
        let region = StreamRegion::new(256);
        assert_eq!(region.committed_position(), 0);

        // 32-byte header + 10-byte payload aligns to 64.
        let pos = region.append_data(1, 2, &[7u8; 10]).unwrap();
        assert_eq!(pos, 64);
        assert_eq!(region.committed_position(), 64);

        // Exactly one alignment unit of payload: 32 + 32 = 64 more.
        let pos = region.append_data(1, 2, &[1u8; 32]).unwrap();
        assert_eq!(pos, 128);
    }

    #[test]
    fn append_rejects_when_segment_is_full() {
        let region = StreamRegion::new(64);
        assert!(region.append_data(1, 2, &[0u8; 8]).is_some());
        assert!(region.append_data(1, 2, &[0u8; 8]).is_none());
        assert_eq!(region.committed_position(), 64);
    }

    #[test]
    fn reserved_value_supplier_sees_payload_in_place() {
        let region = StreamRegion::new(128);
        region
            .append_with(FRAME_TYPE_DATA, 1, 2, b"abc", |buf, payload_offset| {
                i64::from(buf.get_u8(payload_offset))
            })
            .unwrap();
        assert_eq!(
            region
                .buffer()
                .get_i64(crate::frame::RESERVED_VALUE_OFFSET),
            i64::from(b'a')
        );
    }

    #[test]
    fn end_of_stream_pins_the_current_tail() {
        let region = StreamRegion::new(128);
        region.append_data(1, 2, &[0u8; 4]).unwrap();
        assert_eq!(region.end_of_stream_position(), i64::MAX);
        region.mark_end_of_stream();
        assert_eq!(region.end_of_stream_position(), 64);
    }
}
