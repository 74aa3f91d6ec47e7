//! Typed views overlaid on a byte region.
//!
//! A flyweight binds to a region at an offset and decodes fields in place;
//! re-binding (`wrap`) is the only identity mutation. Decoding a message
//! through a flyweight never allocates a private copy of its bytes. The
//! declared size exists for callers computing variable-length payload
//! boundaries: `set_size` must be called before any read that depends on
//! the new size. No bounds checking against message content is implied;
//! callers pass length-validated offsets.

use std::sync::Arc;

use crate::buffer::RegionBuffer;

/// Re-bindable view contract shared by all typed overlays.
pub trait Flyweight {
    /// Rebind the view to start at `offset` within `buffer`. Returns the
    /// view so wraps can be chained.
    fn wrap(&mut self, buffer: Arc<RegionBuffer>, offset: usize) -> &mut Self;

    /// Logical length of the current binding.
    fn size(&self) -> usize;

    /// Declare the logical length after a wrap, e.g. once a var-length
    /// payload's extent is known.
    fn set_size(&mut self, size: usize);
}

/// Common (buffer, offset, size) state for typed overlays.
#[derive(Default)]
pub struct ViewBase {
    buffer: Option<Arc<RegionBuffer>>,
    offset: usize,
    size: usize,
}

impl ViewBase {
    pub fn bind(&mut self, buffer: Arc<RegionBuffer>, offset: usize) {
        debug_assert!(offset <= buffer.capacity());
        self.buffer = Some(buffer);
        self.offset = offset;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    /// Backing region, panicking if the view was never wrapped. Typed
    /// overlays only call this from field accessors, which are meaningless
    /// before a wrap.
    pub fn buffer(&self) -> &RegionBuffer {
        self.buffer.as_deref().expect("flyweight accessed before wrap")
    }
}

/// Offsets of the framing header prefixed to every application message.
/// Wire-exact, little-endian: schema id, template id, block length, version.
pub mod message_header {
    pub const SCHEMA_ID_OFFSET: usize = 0;
    pub const TEMPLATE_ID_OFFSET: usize = 2;
    pub const BLOCK_LENGTH_OFFSET: usize = 4;
    pub const VERSION_OFFSET: usize = 6;
    pub const ENCODED_LENGTH: usize = 8;
}

/// Flyweight over the fixed 8-byte message framing header.
#[derive(Default)]
pub struct MessageHeaderView {
    base: ViewBase,
}

impl MessageHeaderView {
    pub fn schema_id(&self) -> u16 {
        self.field(message_header::SCHEMA_ID_OFFSET)
    }

    pub fn template_id(&self) -> u16 {
        self.field(message_header::TEMPLATE_ID_OFFSET)
    }

    pub fn block_length(&self) -> u16 {
        self.field(message_header::BLOCK_LENGTH_OFFSET)
    }

    pub fn version(&self) -> u16 {
        self.field(message_header::VERSION_OFFSET)
    }

    pub fn put_schema_id(&self, value: u16) {
        self.put_field(message_header::SCHEMA_ID_OFFSET, value);
    }

    pub fn put_template_id(&self, value: u16) {
        self.put_field(message_header::TEMPLATE_ID_OFFSET, value);
    }

    pub fn put_block_length(&self, value: u16) {
        self.put_field(message_header::BLOCK_LENGTH_OFFSET, value);
    }

    pub fn put_version(&self, value: u16) {
        self.put_field(message_header::VERSION_OFFSET, value);
    }

    fn field(&self, rel: usize) -> u16 {
        self.base.buffer().get_u16(self.base.offset() + rel)
    }

    fn put_field(&self, rel: usize, value: u16) {
        self.base.buffer().put_u16(self.base.offset() + rel, value);
    }
}

impl Flyweight for MessageHeaderView {
    fn wrap(&mut self, buffer: Arc<RegionBuffer>, offset: usize) -> &mut Self {
        self.base.bind(buffer, offset);
        self.base.set_size(message_header::ENCODED_LENGTH);
        self
    }

    fn size(&self) -> usize {
        self.base.size()
    }

    fn set_size(&mut self, size: usize) {
        self.base.set_size(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_land_at_wire_offsets() {
        let buf = Arc::new(RegionBuffer::new(64));
        let mut view = MessageHeaderView::default();
        view.wrap(Arc::clone(&buf), 16);
        view.put_schema_id(111);
        view.put_template_id(21);
        view.put_block_length(40);
        view.put_version(2);

        assert_eq!(buf.get_u16(16), 111);
        assert_eq!(buf.get_u16(18), 21);
        assert_eq!(buf.get_u16(20), 40);
        assert_eq!(buf.get_u16(22), 2);
        assert_eq!(view.size(), message_header::ENCODED_LENGTH);
    }

    #[test]
    fn rewrap_moves_the_view_without_copying() {
        let buf = Arc::new(RegionBuffer::new(64));
        buf.put_u16(0, 7);
        buf.put_u16(32, 9);

        let mut view = MessageHeaderView::default();
        assert_eq!(view.wrap(Arc::clone(&buf), 0).schema_id(), 7);
        assert_eq!(view.wrap(buf, 32).schema_id(), 9);
    }

    #[test]
    fn set_size_tracks_variable_length_extent() {
        let buf = Arc::new(RegionBuffer::new(64));
        let mut view = MessageHeaderView::default();
        view.wrap(buf, 0);
        view.set_size(24);
        assert_eq!(view.size(), 24);
    }
}
