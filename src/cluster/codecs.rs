//! Decoders for the schema-versioned consensus event stream.
//!
//! Every log fragment starts with the 8-byte framing header; the body is a
//! fixed block of `block_length` bytes followed by length-prefixed
//! var-length fields. Decoders honor the announced block length so a newer
//! peer's wider block still decodes (the extra trailing fields are
//! skipped), while a block shorter than the decoder's minimum is an error.
//! The log is an append-only artifact written by multiple nodes across
//! versions; none of these errors may halt the stream, so they surface as
//! values for the adapter to report and drop.

use thiserror::Error;

use crate::buffer::RegionBuffer;
use crate::flyweight::message_header;

pub const CLUSTER_SCHEMA_ID: u16 = 111;
pub const CLUSTER_SCHEMA_VERSION: u16 = 1;

pub const SESSION_MESSAGE_HEADER_TEMPLATE_ID: u16 = 1;
pub const TIMER_EVENT_TEMPLATE_ID: u16 = 20;
pub const SESSION_OPEN_TEMPLATE_ID: u16 = 21;
pub const SESSION_CLOSE_TEMPLATE_ID: u16 = 22;
pub const CLUSTER_ACTION_REQUEST_TEMPLATE_ID: u16 = 23;
pub const NEW_LEADERSHIP_TERM_TEMPLATE_ID: u16 = 24;
pub const MEMBERSHIP_CHANGE_TEMPLATE_ID: u16 = 25;

/// Framing header plus the session-message fixed block. The application
/// payload of a session message starts at this offset within the fragment.
pub const SESSION_MESSAGE_HEADER_LENGTH: usize =
    message_header::ENCODED_LENGTH + SessionMessageHeader::BLOCK_LENGTH;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("fragment truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("template {template_id} block length {block_length} below minimum {minimum}")]
    BlockTooShort {
        template_id: u16,
        block_length: usize,
        minimum: usize,
    },
    #[error("var field length {length} overruns fragment of {available} bytes")]
    VarFieldOverrun { length: usize, available: usize },
}

/// Decoded framing header. Read directly rather than through the
/// re-bindable flyweight so decode needs no shared buffer handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub schema_id: u16,
    pub template_id: u16,
    pub block_length: u16,
    pub version: u16,
}

impl MessageHeader {
    pub fn read(buffer: &RegionBuffer, offset: usize, length: usize) -> Result<Self, CodecError> {
        if length < message_header::ENCODED_LENGTH {
            return Err(CodecError::Truncated {
                needed: message_header::ENCODED_LENGTH,
                available: length,
            });
        }
        Ok(Self {
            schema_id: buffer.get_u16(offset + message_header::SCHEMA_ID_OFFSET),
            template_id: buffer.get_u16(offset + message_header::TEMPLATE_ID_OFFSET),
            block_length: buffer.get_u16(offset + message_header::BLOCK_LENGTH_OFFSET),
            version: buffer.get_u16(offset + message_header::VERSION_OFFSET),
        })
    }
}

/// Reason a cluster session was closed, as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    ClientAction,
    ServiceAction,
    Timeout,
    /// Version skew: a reason this build does not know.
    Unknown(i32),
}

impl From<i32> for CloseReason {
    fn from(code: i32) -> Self {
        match code {
            0 => CloseReason::ClientAction,
            1 => CloseReason::ServiceAction,
            2 => CloseReason::Timeout,
            other => CloseReason::Unknown(other),
        }
    }
}

/// Action requested of every service at a committed log position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterAction {
    Snapshot,
    Shutdown,
    Abort,
    Unknown(i32),
}

impl From<i32> for ClusterAction {
    fn from(code: i32) -> Self {
        match code {
            0 => ClusterAction::Snapshot,
            1 => ClusterAction::Shutdown,
            2 => ClusterAction::Abort,
            other => ClusterAction::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerEvent {
    pub correlation_id: i64,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOpenEvent {
    pub leadership_term_id: i64,
    pub cluster_session_id: i64,
    pub timestamp: i64,
    pub response_stream_id: i32,
    pub response_channel: String,
    pub encoded_principal: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionCloseEvent {
    pub leadership_term_id: i64,
    pub cluster_session_id: i64,
    pub timestamp: i64,
    pub close_reason: CloseReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterActionRequest {
    pub leadership_term_id: i64,
    pub log_position: i64,
    pub timestamp: i64,
    pub action: ClusterAction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewLeadershipTermEvent {
    pub leadership_term_id: i64,
    pub log_position: i64,
    pub timestamp: i64,
    pub term_base_log_position: i64,
    pub leader_member_id: i32,
    pub log_session_id: i32,
    pub time_unit: i32,
    pub app_version: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MembershipChangeEvent {
    pub leadership_term_id: i64,
    pub log_position: i64,
    pub timestamp: i64,
    pub leader_member_id: i32,
    pub member_id: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionMessageHeader {
    pub leadership_term_id: i64,
    pub cluster_session_id: i64,
    pub timestamp: i64,
}

impl SessionMessageHeader {
    pub const BLOCK_LENGTH: usize = 24;
}

/// One decoded consensus event. Closed set: adding a wire template without
/// handling it where events are dispatched is a compile error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEvent {
    Timer(TimerEvent),
    SessionOpen(SessionOpenEvent),
    SessionClose(SessionCloseEvent),
    ClusterAction(ClusterActionRequest),
    NewLeadershipTerm(NewLeadershipTermEvent),
    MembershipChange(MembershipChangeEvent),
    SessionMessage(SessionMessageHeader),
}

/// Decode the event body following an already-read header.
///
/// `offset`/`length` delimit the whole fragment including the framing
/// header. `Ok(None)` marks an unrecognized template id, which callers
/// treat as droppable rather than fatal.
pub fn decode_log_event(
    buffer: &RegionBuffer,
    offset: usize,
    length: usize,
    header: MessageHeader,
) -> Result<Option<LogEvent>, CodecError> {
    let body = BodyDecoder::new(buffer, offset, length, header)?;
    let event = match header.template_id {
        TIMER_EVENT_TEMPLATE_ID => {
            let mut block = body.block(16)?;
            LogEvent::Timer(TimerEvent {
                correlation_id: block.i64()?,
                timestamp: block.i64()?,
            })
        }
        SESSION_OPEN_TEMPLATE_ID => {
            let mut block = body.block(28)?;
            let leadership_term_id = block.i64()?;
            let cluster_session_id = block.i64()?;
            let timestamp = block.i64()?;
            let response_stream_id = block.i32()?;
            let mut var = body.var_section();
            let response_channel = String::from_utf8_lossy(&var.bytes()?).into_owned();
            let encoded_principal = var.bytes()?;
            LogEvent::SessionOpen(SessionOpenEvent {
                leadership_term_id,
                cluster_session_id,
                timestamp,
                response_stream_id,
                response_channel,
                encoded_principal,
            })
        }
        SESSION_CLOSE_TEMPLATE_ID => {
            let mut block = body.block(28)?;
            LogEvent::SessionClose(SessionCloseEvent {
                leadership_term_id: block.i64()?,
                cluster_session_id: block.i64()?,
                timestamp: block.i64()?,
                close_reason: CloseReason::from(block.i32()?),
            })
        }
        CLUSTER_ACTION_REQUEST_TEMPLATE_ID => {
            let mut block = body.block(28)?;
            LogEvent::ClusterAction(ClusterActionRequest {
                leadership_term_id: block.i64()?,
                log_position: block.i64()?,
                timestamp: block.i64()?,
                action: ClusterAction::from(block.i32()?),
            })
        }
        NEW_LEADERSHIP_TERM_TEMPLATE_ID => {
            let mut block = body.block(48)?;
            LogEvent::NewLeadershipTerm(NewLeadershipTermEvent {
                leadership_term_id: block.i64()?,
                log_position: block.i64()?,
                timestamp: block.i64()?,
                term_base_log_position: block.i64()?,
                leader_member_id: block.i32()?,
                log_session_id: block.i32()?,
                time_unit: block.i32()?,
                app_version: block.i32()?,
            })
        }
        MEMBERSHIP_CHANGE_TEMPLATE_ID => {
            let mut block = body.block(32)?;
            LogEvent::MembershipChange(MembershipChangeEvent {
                leadership_term_id: block.i64()?,
                log_position: block.i64()?,
                timestamp: block.i64()?,
                leader_member_id: block.i32()?,
                member_id: block.i32()?,
            })
        }
        SESSION_MESSAGE_HEADER_TEMPLATE_ID => {
            let mut block = body.block(SessionMessageHeader::BLOCK_LENGTH)?;
            LogEvent::SessionMessage(SessionMessageHeader {
                leadership_term_id: block.i64()?,
                cluster_session_id: block.i64()?,
                timestamp: block.i64()?,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Cursored access to one event body, split into the fixed block (bounded
/// by the smaller of the announced and known block lengths) and the
/// var-length section starting after the announced block.
struct BodyDecoder<'a> {
    buffer: &'a RegionBuffer,
    block_start: usize,
    block_length: usize,
    end: usize,
    template_id: u16,
}

impl<'a> BodyDecoder<'a> {
    fn new(
        buffer: &'a RegionBuffer,
        offset: usize,
        length: usize,
        header: MessageHeader,
    ) -> Result<Self, CodecError> {
        let block_start = offset + message_header::ENCODED_LENGTH;
        let end = offset + length;
        let block_length = header.block_length as usize;
        if block_start + block_length > end {
            return Err(CodecError::Truncated {
                needed: message_header::ENCODED_LENGTH + block_length,
                available: length,
            });
        }
        Ok(Self {
            buffer,
            block_start,
            block_length,
            end,
            template_id: header.template_id,
        })
    }

    fn block(&self, minimum: usize) -> Result<FieldCursor<'a>, CodecError> {
        if self.block_length < minimum {
            return Err(CodecError::BlockTooShort {
                template_id: self.template_id,
                block_length: self.block_length,
                minimum,
            });
        }
        Ok(FieldCursor {
            buffer: self.buffer,
            at: self.block_start,
            end: self.block_start + self.block_length,
        })
    }

    fn var_section(&self) -> FieldCursor<'a> {
        FieldCursor {
            buffer: self.buffer,
            at: self.block_start + self.block_length,
            end: self.end,
        }
    }
}

struct FieldCursor<'a> {
    buffer: &'a RegionBuffer,
    at: usize,
    end: usize,
}

impl FieldCursor<'_> {
    fn ensure(&self, n: usize) -> Result<(), CodecError> {
        if self.at + n > self.end {
            return Err(CodecError::Truncated {
                needed: n,
                available: self.end.saturating_sub(self.at),
            });
        }
        Ok(())
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.ensure(4)?;
        let v = self.buffer.get_i32(self.at);
        self.at += 4;
        Ok(v)
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        self.ensure(8)?;
        let v = self.buffer.get_i64(self.at);
        self.at += 8;
        Ok(v)
    }

    /// u32-length-prefixed var field.
    fn bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        self.ensure(4)?;
        let length = self.buffer.get_u32(self.at) as usize;
        self.at += 4;
        if self.at + length > self.end {
            return Err(CodecError::VarFieldOverrun {
                length,
                available: self.end - self.at,
            });
        }
        let out = self.buffer.get_bytes(self.at, length);
        self.at += length;
        Ok(out)
    }
}

pub mod encode {
    //! Event writers used to seed log regions from tests and tooling.
    //! The data path itself only ever decodes.

    use super::*;

    pub struct EventWriter {
        bytes: Vec<u8>,
    }

    impl EventWriter {
        pub fn new(template_id: u16, block_length: u16, version: u16) -> Self {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&CLUSTER_SCHEMA_ID.to_le_bytes());
            bytes.extend_from_slice(&template_id.to_le_bytes());
            bytes.extend_from_slice(&block_length.to_le_bytes());
            bytes.extend_from_slice(&version.to_le_bytes());
            Self { bytes }
        }

        pub fn with_schema(mut self, schema_id: u16) -> Self {
            self.bytes[0..2].copy_from_slice(&schema_id.to_le_bytes());
            self
        }

        pub fn i32(mut self, v: i32) -> Self {
            self.bytes.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn i64(mut self, v: i64) -> Self {
            self.bytes.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn var(mut self, v: &[u8]) -> Self {
            self.bytes.extend_from_slice(&(v.len() as u32).to_le_bytes());
            self.bytes.extend_from_slice(v);
            self
        }

        pub fn raw(mut self, v: &[u8]) -> Self {
            self.bytes.extend_from_slice(v);
            self
        }

        pub fn finish(self) -> Vec<u8> {
            self.bytes
        }
    }

    pub fn session_open(cluster_session_id: i64, response_stream_id: i32, channel: &str) -> Vec<u8> {
        EventWriter::new(SESSION_OPEN_TEMPLATE_ID, 28, CLUSTER_SCHEMA_VERSION)
            .i64(5)
            .i64(cluster_session_id)
            .i64(1_000)
            .i32(response_stream_id)
            .var(channel.as_bytes())
            .var(b"principal")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::encode::EventWriter;
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Option<LogEvent>, CodecError> {
        let buffer = RegionBuffer::new(bytes.len().max(8));
        buffer.put_bytes(0, bytes);
        let header = MessageHeader::read(&buffer, 0, bytes.len())?;
        decode_log_event(&buffer, 0, bytes.len(), header)
    }

    #[test]
    fn session_open_round_trip() {
        let event = decode(&encode::session_open(7, 100, "endpoint-A"))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            LogEvent::SessionOpen(SessionOpenEvent {
                leadership_term_id: 5,
                cluster_session_id: 7,
                timestamp: 1_000,
                response_stream_id: 100,
                response_channel: "endpoint-A".to_string(),
                encoded_principal: b"principal".to_vec(),
            })
        );
    }

    #[test]
    fn wider_block_from_a_newer_writer_still_decodes() {
        // Same session-close fields plus 8 unknown trailing block bytes.
        let bytes = EventWriter::new(SESSION_CLOSE_TEMPLATE_ID, 36, 2)
            .i64(5)
            .i64(7)
            .i64(999)
            .i32(2)
            .raw(&[0xEE; 8])
            .finish();
        let event = decode(&bytes).unwrap().unwrap();
        assert_eq!(
            event,
            LogEvent::SessionClose(SessionCloseEvent {
                leadership_term_id: 5,
                cluster_session_id: 7,
                timestamp: 999,
                close_reason: CloseReason::Timeout,
            })
        );
    }

    #[test]
    fn narrower_block_than_the_minimum_is_an_error() {
        let bytes = EventWriter::new(SESSION_CLOSE_TEMPLATE_ID, 16, 1)
            .i64(5)
            .i64(7)
            .finish();
        assert_eq!(
            decode(&bytes),
            Err(CodecError::BlockTooShort {
                template_id: SESSION_CLOSE_TEMPLATE_ID,
                block_length: 16,
                minimum: 28,
            })
        );
    }

    #[test]
    fn unknown_template_is_a_distinct_marker_not_an_error() {
        let bytes = EventWriter::new(999, 8, 1).i64(1).finish();
        assert_eq!(decode(&bytes), Ok(None));
    }

    #[test]
    fn truncated_fragment_is_an_error() {
        let bytes = EventWriter::new(TIMER_EVENT_TEMPLATE_ID, 16, 1)
            .i64(1)
            .i64(2)
            .finish();
        // Chop the last byte of the block.
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_enum_codes_survive_as_values() {
        assert_eq!(CloseReason::from(9), CloseReason::Unknown(9));
        assert_eq!(ClusterAction::from(2), ClusterAction::Abort);
        assert_eq!(ClusterAction::from(77), ClusterAction::Unknown(77));
    }

    #[test]
    fn new_leadership_term_decodes_all_fields() {
        let bytes = EventWriter::new(NEW_LEADERSHIP_TERM_TEMPLATE_ID, 48, 1)
            .i64(6)
            .i64(4096)
            .i64(2_000)
            .i64(1024)
            .i32(3)
            .i32(-55)
            .i32(1)
            .i32(7)
            .finish();
        let event = decode(&bytes).unwrap().unwrap();
        assert_eq!(
            event,
            LogEvent::NewLeadershipTerm(NewLeadershipTermEvent {
                leadership_term_id: 6,
                log_position: 4096,
                timestamp: 2_000,
                term_base_log_position: 1024,
                leader_member_id: 3,
                log_session_id: -55,
                time_unit: 1,
                app_version: 7,
            })
        );
    }
}
