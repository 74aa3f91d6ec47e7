//! Data-frame layout for fragments within a stream segment.
//!
//! Every fragment is framed by a fixed 32-byte header and padded to 32-byte
//! alignment. A frame length of zero means the slot past the committed tail
//! has not been written; scanning stops there. PADDING frames consume space
//! without being delivered to handlers.

use crate::buffer::RegionBuffer;

pub const FRAME_ALIGNMENT: usize = 32;
pub const DATA_FRAME_HEADER_LENGTH: usize = 32;

pub const FRAME_LENGTH_OFFSET: usize = 0;
pub const VERSION_OFFSET: usize = 4;
pub const FLAGS_OFFSET: usize = 5;
pub const TYPE_OFFSET: usize = 6;
pub const SESSION_ID_OFFSET: usize = 8;
pub const STREAM_ID_OFFSET: usize = 12;
pub const RESERVED_VALUE_OFFSET: usize = 16;

pub const FRAME_TYPE_PADDING: u16 = 0;
pub const FRAME_TYPE_DATA: u16 = 1;

pub const CURRENT_FRAME_VERSION: u8 = 1;

/// Round `length` up to the frame alignment.
pub fn align_frame_length(length: usize) -> usize {
    (length + FRAME_ALIGNMENT - 1) & !(FRAME_ALIGNMENT - 1)
}

/// Read-only description of one delivered fragment's frame, including the
/// stream position immediately after the fragment is consumed. Several log
/// event kinds need that position to correlate with a leadership term.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    frame_offset: usize,
    frame_length: usize,
    frame_type: u16,
    flags: u8,
    session_id: i32,
    stream_id: i32,
    reserved_value: i64,
    position: i64,
}

impl FrameContext {
    /// Decode the frame starting at `frame_offset`. `position` is the
    /// stream position after the whole aligned frame is consumed.
    pub fn read(buffer: &RegionBuffer, frame_offset: usize, position: i64) -> Self {
        Self {
            frame_offset,
            frame_length: buffer.get_i32(frame_offset + FRAME_LENGTH_OFFSET) as usize,
            frame_type: buffer.get_u16(frame_offset + TYPE_OFFSET),
            flags: buffer.get_u8(frame_offset + FLAGS_OFFSET),
            session_id: buffer.get_i32(frame_offset + SESSION_ID_OFFSET),
            stream_id: buffer.get_i32(frame_offset + STREAM_ID_OFFSET),
            reserved_value: buffer.get_i64(frame_offset + RESERVED_VALUE_OFFSET),
            position,
        }
    }

    pub fn frame_offset(&self) -> usize {
        self.frame_offset
    }

    /// Framed length: header plus payload, before alignment padding.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn payload_length(&self) -> usize {
        self.frame_length - DATA_FRAME_HEADER_LENGTH
    }

    pub fn is_padding(&self) -> bool {
        self.frame_type == FRAME_TYPE_PADDING
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    pub fn reserved_value(&self) -> i64 {
        self.reserved_value
    }

    /// Stream position after this fragment, alignment included.
    pub fn position(&self) -> i64 {
        self.position
    }
}

/// Write a frame header for a payload of `payload_length` bytes. Returns
/// the unaligned frame length.
pub fn write_frame_header(
    buffer: &RegionBuffer,
    frame_offset: usize,
    frame_type: u16,
    session_id: i32,
    stream_id: i32,
    payload_length: usize,
) -> usize {
    let frame_length = DATA_FRAME_HEADER_LENGTH + payload_length;
    buffer.put_u8(frame_offset + VERSION_OFFSET, CURRENT_FRAME_VERSION);
    buffer.put_u8(frame_offset + FLAGS_OFFSET, 0);
    buffer.put_u16(frame_offset + TYPE_OFFSET, frame_type);
    buffer.put_i32(frame_offset + SESSION_ID_OFFSET, session_id);
    buffer.put_i32(frame_offset + STREAM_ID_OFFSET, stream_id);
    buffer.put_i64(frame_offset + RESERVED_VALUE_OFFSET, 0);
    // Length is written last by convention; the tail store publishes it.
    buffer.put_i32(frame_offset + FRAME_LENGTH_OFFSET, frame_length as i32);
    frame_length
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up_to_32() {
        assert_eq!(align_frame_length(0), 0);
        assert_eq!(align_frame_length(1), 32);
        assert_eq!(align_frame_length(32), 32);
        assert_eq!(align_frame_length(33), 64);
        assert_eq!(align_frame_length(95), 96);
    }

    #[test]
    fn context_reflects_written_header() {
        let buf = RegionBuffer::new(128);
        let frame_length = write_frame_header(&buf, 32, FRAME_TYPE_DATA, 5, 10, 20);
        assert_eq!(frame_length, 52);
        buf.put_i64(32 + RESERVED_VALUE_OFFSET, 99);

        let ctx = FrameContext::read(&buf, 32, 96);
        assert_eq!(ctx.frame_length(), 52);
        assert_eq!(ctx.payload_length(), 20);
        assert_eq!(ctx.session_id(), 5);
        assert_eq!(ctx.stream_id(), 10);
        assert_eq!(ctx.reserved_value(), 99);
        assert_eq!(ctx.position(), 96);
        assert!(!ctx.is_padding());
    }
}
