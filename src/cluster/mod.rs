//! Clustered/replicated variant: consensus-log decoding and the client
//! session surface the state machine uses to answer logical clients.

pub mod adapter;
pub mod codecs;
pub mod session;

pub use adapter::{AdapterOptions, BoundedLogAdapter, ClusterService};
pub use codecs::{CloseReason, ClusterAction, CodecError, LogEvent, MessageHeader};
pub use session::{ClientSession, ServiceDirectory, SessionError, DEFAULT_PUBLICATION_TIMEOUT};
