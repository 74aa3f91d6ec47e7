//! Multiplexed polling across the publisher streams of one channel+stream.
//!
//! The image set is the only structure mutated concurrently with the
//! hot-path poller: the conductor thread adds and removes images while the
//! duty-cycle thread polls. Mutations publish a whole new snapshot through
//! an atomic swap, so an in-flight poll always sees either the pre- or
//! post-mutation set in its entirety and the poller is never delayed by a
//! lock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::buffer::RegionBuffer;
use crate::driver::{Conductor, DriverError, CHANNEL_STATUS_ACTIVE, CHANNEL_STATUS_CLOSED, COUNTER_TYPE_LOCAL_SOCKET_ADDRESS};
use crate::frame::FrameContext;
use crate::image::Image;

/// Receiver side for one channel and stream id pairing.
pub struct Subscription {
    conductor: Arc<dyn Conductor + Send + Sync>,
    channel: String,
    stream_id: i32,
    registration_id: i64,
    channel_status_id: i32,
    images: ArcSwap<Vec<Arc<Image>>>,
    round_robin_index: AtomicUsize,
    is_closed: AtomicBool,
}

impl Subscription {
    pub fn new(
        conductor: Arc<dyn Conductor + Send + Sync>,
        channel: impl Into<String>,
        registration_id: i64,
        stream_id: i32,
        channel_status_id: i32,
    ) -> Self {
        Self {
            conductor,
            channel: channel.into(),
            stream_id,
            registration_id,
            channel_status_id,
            images: ArcSwap::from_pointee(Vec::new()),
            round_robin_index: AtomicUsize::new(0),
            is_closed: AtomicBool::new(false),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    pub fn channel_status_id(&self) -> i32 {
        self.channel_status_id
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    /// Poll the images under one cumulative fragment budget.
    ///
    /// One snapshot of the image set is taken per call. The scan starts at
    /// the round-robin cursor, clamped to the live count, and the cursor
    /// advances by one (mod count) before the scan begins, so over `N ≥
    /// count` consecutive calls every image gets the first slot.
    pub fn poll<E, H>(&self, handler: &mut H, fragment_limit: usize) -> Result<usize, E>
    where
        H: FnMut(&Arc<RegionBuffer>, usize, usize, &FrameContext) -> Result<(), E>,
    {
        let snapshot = self.images.load();
        let count = snapshot.len();
        if count == 0 {
            return Ok(0);
        }

        let cursor = self.round_robin_index.load(Ordering::Relaxed);
        let starting_index = if cursor >= count { 0 } else { cursor };
        self.round_robin_index
            .store((starting_index + 1) % count, Ordering::Relaxed);

        let mut fragments_read = 0;
        for image in snapshot[starting_index..]
            .iter()
            .chain(snapshot[..starting_index].iter())
        {
            if fragments_read >= fragment_limit {
                break;
            }
            fragments_read += image.poll(handler, fragment_limit - fragments_read)?;
        }

        Ok(fragments_read)
    }

    /// Install a new snapshot equal to the current set plus `image`. Called
    /// from the conductor thread when the driver signals a new publisher.
    pub fn add_image(&self, image: Arc<Image>) {
        let current = self.images.load();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(image);
        self.images.store(Arc::new(next));
    }

    /// Remove the image with `correlation_id`, returning it for lingering
    /// by the caller. Order among images is not significant, so removal
    /// swaps with the last entry.
    pub fn remove_image(&self, correlation_id: i64) -> Option<Arc<Image>> {
        let current = self.images.load();
        let index = current
            .iter()
            .position(|image| image.correlation_id() == correlation_id)?;

        let mut next: Vec<Arc<Image>> = current.iter().cloned().collect();
        let removed = next.swap_remove(index);
        self.images.store(Arc::new(next));
        tracing::debug!(
            correlation_id,
            registration_id = self.registration_id,
            "removed image from subscription"
        );
        Some(removed)
    }

    pub fn has_image(&self, session_id: i32) -> bool {
        self.images
            .load()
            .iter()
            .any(|image| image.session_id() == session_id)
    }

    pub fn image_by_session_id(&self, session_id: i32) -> Option<Arc<Image>> {
        self.images
            .load()
            .iter()
            .find(|image| image.session_id() == session_id)
            .cloned()
    }

    pub fn image_count(&self) -> usize {
        self.images.load().len()
    }

    pub fn has_images(&self) -> bool {
        !self.images.load().is_empty()
    }

    /// True iff at least one image in the current snapshot is open.
    pub fn is_connected(&self) -> bool {
        self.images.load().iter().any(|image| !image.is_closed())
    }

    /// Driver-maintained channel status, or the client-local closed
    /// sentinel once this subscription is closed.
    pub fn channel_status(&self) -> i64 {
        if self.is_closed() {
            return CHANNEL_STATUS_CLOSED;
        }
        self.conductor.counter_value(self.channel_status_id)
    }

    /// Idempotent: only the first caller proceeds. Empties the image set
    /// and hands the detached images to the conductor's release path for
    /// lingering. A failed driver release is surfaced rather than
    /// swallowed; the subscription is closed either way.
    pub fn close(&self) -> Result<(), DriverError> {
        if self
            .is_closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let detached = self.images.swap(Arc::new(Vec::new()));
        self.conductor
            .release_subscription(self.registration_id, detached.as_ref().clone())
    }

    /// When the channel is active, has exactly one bound local address and
    /// the configured endpoint requested an ephemeral port (`:0`), returns
    /// the channel rewritten with the concrete bound port. Any other active
    /// state returns the channel unchanged; an inactive channel returns
    /// `None`.
    pub fn try_resolve_channel_endpoint_port(&self) -> Option<String> {
        if self.channel_status() != CHANNEL_STATUS_ACTIVE {
            return None;
        }

        let addresses = self.local_socket_addresses();
        if addresses.len() != 1 {
            return Some(self.channel.clone());
        }

        let Some(endpoint) = channel_param(&self.channel, "endpoint") else {
            return Some(self.channel.clone());
        };
        if !endpoint.ends_with(":0") {
            return Some(self.channel.clone());
        }

        let resolved = &addresses[0];
        let Some(port_at) = resolved.rfind(':') else {
            return Some(self.channel.clone());
        };
        let rewritten_endpoint =
            format!("{}{}", &endpoint[..endpoint.len() - 2], &resolved[port_at..]);
        Some(self.channel.replacen(
            &format!("endpoint={endpoint}"),
            &format!("endpoint={rewritten_endpoint}"),
            1,
        ))
    }

    /// Bound local socket addresses for this subscription's channel, read
    /// from the driver's local-address counters. Empty unless the channel
    /// is active.
    pub fn local_socket_addresses(&self) -> Vec<String> {
        if self.channel_status() != CHANNEL_STATUS_ACTIVE {
            return Vec::new();
        }

        let mut bindings = Vec::new();
        self.conductor
            .scan_for_type(COUNTER_TYPE_LOCAL_SOCKET_ADDRESS, &mut |counter_id, key| {
                if key.len() < 8 {
                    return;
                }
                let status_id = i32::from_le_bytes([key[0], key[1], key[2], key[3]]);
                let length = i32::from_le_bytes([key[4], key[5], key[6], key[7]]) as usize;
                if status_id == self.channel_status_id
                    && length > 0
                    && key.len() >= 8 + length
                    && self.conductor.counter_value(counter_id) == CHANNEL_STATUS_ACTIVE
                {
                    bindings.push(String::from_utf8_lossy(&key[8..8 + length]).into_owned());
                }
            });
        bindings
    }
}

/// Extract a `key=value` parameter from a channel string of the form
/// `scheme:media?key=value|key=value`. Channel URI parsing proper lives
/// with the conductor; the data path only ever needs single parameters.
fn channel_param<'a>(channel: &'a str, key: &str) -> Option<&'a str> {
    let (_, params) = channel.split_once('?')?;
    params
        .split('|')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}
