//! Client-side data path of a shared-memory message transport.
//!
//! A separate driver process places messages into pre-established shared
//! memory segments; this crate reads them without copying. Typed flyweight
//! views overlay raw regions, an [`Image`] reads one publisher stream in
//! position order, and a [`Subscription`] multiplexes many images under one
//! fragment budget while the conductor thread adds and removes them. The
//! [`cluster`] module layers a bounded consensus-log adapter and client
//! sessions on top for the replicated variant.
//!
//! The hot path is single-threaded cooperative polling: nothing in
//! `poll`/`bounded_poll` blocks. Administrative mutation happens on another
//! thread and publishes copy-on-write snapshots, so pollers are never
//! delayed by it.

#![forbid(unsafe_code)]

pub mod buffer;
pub mod cluster;
pub mod driver;
pub mod flyweight;
pub mod frame;
pub mod image;
pub mod publication;
pub mod stream;
pub mod subscription;

pub use buffer::RegionBuffer;
pub use cluster::{BoundedLogAdapter, ClientSession, ClusterService};
pub use driver::{Conductor, CounterReader, DriverError};
pub use flyweight::{Flyweight, MessageHeaderView};
pub use frame::FrameContext;
pub use image::Image;
pub use publication::Publication;
pub use stream::StreamRegion;
pub use subscription::Subscription;
