//! Per-logical-client response handle used by the state machine.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use thiserror::Error;

use crate::buffer::RegionBuffer;
use crate::publication::{Publication, ReservedValueSupplier};

pub const DEFAULT_PUBLICATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("response publication for session {id} not ready within {timeout:?}")]
    PublicationTimeout { id: i64, timeout: Duration },
    #[error("administrative path abandoned the publication handshake for session {id}")]
    PublicationLost { id: i64 },
}

/// Surface of the owning agent a session needs: registration lookup,
/// removal bookkeeping, and the actual outbound offer path.
pub trait ServiceDirectory {
    fn session_registered(&self, id: i64) -> bool;

    fn close_session(&self, id: i64);

    fn offer_to_session(
        &self,
        id: i64,
        publication: &Publication,
        buffer: &RegionBuffer,
        offset: usize,
        length: usize,
        reserved_value_supplier: ReservedValueSupplier<'_>,
    ) -> i64;
}

/// Handle for answering one logical client over its dedicated response
/// stream. The outbound publication is acquired once at construction and
/// held for the session's lifetime.
pub struct ClientSession {
    id: i64,
    response_stream_id: i32,
    response_channel: String,
    encoded_principal: Vec<u8>,
    directory: Arc<dyn ServiceDirectory + Send + Sync>,
    response: Arc<Publication>,
}

impl ClientSession {
    /// Wait for the administrative path to finish the asynchronous
    /// publication-creation handshake, then bind the session to the
    /// resulting publication. This is the one intentionally blocking call
    /// in the session lifecycle, performed once and bounded by `timeout`.
    pub fn connect(
        id: i64,
        response_stream_id: i32,
        response_channel: impl Into<String>,
        encoded_principal: Vec<u8>,
        directory: Arc<dyn ServiceDirectory + Send + Sync>,
        publication: &Receiver<Arc<Publication>>,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        let response = publication.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SessionError::PublicationTimeout { id, timeout },
            RecvTimeoutError::Disconnected => SessionError::PublicationLost { id },
        })?;

        Ok(Self {
            id,
            response_stream_id,
            response_channel: response_channel.into(),
            encoded_principal,
            directory,
            response,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn response_stream_id(&self) -> i32 {
        self.response_stream_id
    }

    pub fn response_channel(&self) -> &str {
        &self.response_channel
    }

    pub fn encoded_principal(&self) -> &[u8] {
        &self.encoded_principal
    }

    pub fn response_publication(&self) -> &Arc<Publication> {
        &self.response
    }

    /// Offer a response to this client. Mirrors the publication's offer
    /// contract: the resulting stream position on success, a negative
    /// sentinel on backpressure or failure, never blocking.
    pub fn offer(
        &self,
        buffer: &RegionBuffer,
        offset: usize,
        length: usize,
        reserved_value_supplier: ReservedValueSupplier<'_>,
    ) -> i64 {
        self.directory.offer_to_session(
            self.id,
            &self.response,
            buffer,
            offset,
            length,
            reserved_value_supplier,
        )
    }

    /// Ask the owning agent to close this session. No-op if the agent has
    /// already unregistered the id, so repeated calls are safe.
    pub fn close(&self) {
        if self.directory.session_registered(self.id) {
            self.directory.close_session(self.id);
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("response_stream_id", &self.response_stream_id)
            .field("response_channel", &self.response_channel)
            .finish()
    }
}
