#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Typed engine events and the internal event bus.
//!
//! Layout: `payloads.rs` (event enum, identifiers, state codes), `routing.rs`
//! (broadcast-backed bus), `error.rs` (identifier parsing errors).
//!
//! The bus has no replay buffer: an event not observed at publish time is lost,
//! so subscribers read the registry for current state and use the bus only for
//! change notification.

pub mod error;
pub mod payloads;
pub mod routing;

pub use error::InvalidTorrentId;
pub use payloads::{
    AnnounceDetail, DEFAULT_BUS_CAPACITY, DiscoveredFile, Event, EventEnvelope, EventId, PeerFlags,
    PeerInfo, TorrentId, TorrentStateCode, TrackerStatus, TransferStats,
};
pub use routing::{EventBus, EventStream};
