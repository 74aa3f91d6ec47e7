//! Fixed-capacity byte region shared between a writer and pollers.
//!
//! The driver (or an outbound [`crate::publication::Publication`]) writes
//! frames into the region while a poller reads them, so the backing storage
//! has to be shareable across threads without locks. The crate forbids
//! `unsafe`, so the region is a slice of `AtomicU8` accessed with relaxed
//! loads and stores. Cross-thread ordering does not come from the data bytes
//! themselves: writers publish progress through a stream tail counter with a
//! Release store, and pollers never look at offsets the Acquire-loaded tail
//! has not covered. Readers of driver-owned counter memory tolerate torn
//! multi-byte reads by re-scanning rather than assuming atomicity.

use std::sync::atomic::{AtomicU8, Ordering};

/// Contiguous byte region addressable by offset, never resized.
///
/// All multi-byte accessors are little-endian. Out-of-range offsets panic
/// via slice indexing; callers are expected to pass length-validated
/// offsets, as with any in-memory structure.
pub struct RegionBuffer {
    bytes: Box<[AtomicU8]>,
}

impl RegionBuffer {
    pub fn new(capacity: usize) -> Self {
        let mut bytes = Vec::with_capacity(capacity);
        bytes.resize_with(capacity, || AtomicU8::new(0));
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn get_u8(&self, offset: usize) -> u8 {
        self.bytes[offset].load(Ordering::Relaxed)
    }

    pub fn put_u8(&self, offset: usize, value: u8) {
        self.bytes[offset].store(value, Ordering::Relaxed);
    }

    pub fn get_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.read_array(offset))
    }

    pub fn put_u16(&self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn get_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.read_array(offset))
    }

    pub fn put_u32(&self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn get_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.read_array(offset))
    }

    pub fn put_i32(&self, offset: usize, value: i32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn get_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.read_array(offset))
    }

    pub fn put_u64(&self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn get_i64(&self, offset: usize) -> i64 {
        i64::from_le_bytes(self.read_array(offset))
    }

    pub fn put_i64(&self, offset: usize, value: i64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Copy `length` bytes out of the region. Used for decoded var-length
    /// fields that outlive the view; fragment payloads are never copied.
    pub fn get_bytes(&self, offset: usize, length: usize) -> Vec<u8> {
        self.bytes[offset..offset + length]
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        self.write_bytes(offset, src);
    }

    fn read_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        for (i, slot) in self.bytes[offset..offset + N].iter().enumerate() {
            out[i] = slot.load(Ordering::Relaxed);
        }
        out
    }

    fn write_bytes(&self, offset: usize, src: &[u8]) {
        for (slot, byte) in self.bytes[offset..offset + src.len()].iter().zip(src) {
            slot.store(*byte, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for RegionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}
