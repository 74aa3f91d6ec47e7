//! Boundary with the media-driver process.
//!
//! The driver itself, its command protocol and its counter files are
//! external collaborators. This module specifies only what the data path
//! consumes from them: counter reads, a counter scan by type, and the
//! release hand-off performed when a subscription closes.

use std::sync::Arc;

use thiserror::Error;

use crate::image::Image;

/// Channel has errored; check the driver log.
pub const CHANNEL_STATUS_ERRORED: i64 = -1;
/// Channel is being initialized.
pub const CHANNEL_STATUS_INITIALIZING: i64 = 0;
/// Channel finished initialization and is active.
pub const CHANNEL_STATUS_ACTIVE: i64 = 1;
/// Channel is being closed.
pub const CHANNEL_STATUS_CLOSING: i64 = 2;
/// Client-local sentinel once the owning subscription is closed. Never
/// driver-visible; distinct from every real status so queries on a closed
/// subscription cannot race with the driver reusing the counter slot.
pub const CHANNEL_STATUS_CLOSED: i64 = -2;

/// Driver counter type carrying one bound local socket address per entry.
/// Key layout: bytes 0..4 channel-status counter id (i32 LE), 4..8 address
/// length (i32 LE), 8.. the UTF-8 address.
pub const COUNTER_TYPE_LOCAL_SOCKET_ADDRESS: i32 = 14;

pub fn channel_status_label(status: i64) -> &'static str {
    match status {
        CHANNEL_STATUS_ERRORED => "errored",
        CHANNEL_STATUS_INITIALIZING => "initializing",
        CHANNEL_STATUS_ACTIVE => "active",
        CHANNEL_STATUS_CLOSING => "closing",
        CHANNEL_STATUS_CLOSED => "closed",
        _ => "unknown",
    }
}

/// Read access to driver-maintained counters. Values are snapshots of
/// driver-owned memory; multi-field records may be observed torn and
/// callers re-scan rather than assume atomicity.
pub trait CounterReader {
    fn counter_value(&self, counter_id: i32) -> i64;

    /// Visit every counter of `type_id` as `(counter_id, key_bytes)`.
    fn scan_for_type(&self, type_id: i32, each: &mut dyn FnMut(i32, &[u8]));
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver no longer agrees this registration exists.
    #[error("registration {registration_id} not known to driver")]
    UnknownRegistration { registration_id: i64 },
    /// The driver did not acknowledge a release in time.
    #[error("driver did not acknowledge release of registration {registration_id}")]
    ReleaseTimeout { registration_id: i64 },
}

/// The administrative component that owns driver registrations on behalf
/// of the data path.
pub trait Conductor: CounterReader {
    /// Release a subscription's registration with the driver. The detached
    /// images are handed over for lingering: the conductor frees them only
    /// once no concurrent reader can still reference them.
    fn release_subscription(
        &self,
        registration_id: i64,
        images: Vec<Arc<Image>>,
    ) -> Result<(), DriverError>;
}
