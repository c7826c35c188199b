#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Native session adapter: the seam between the engine and an embedded protocol engine.
//!
//! Layout: `session/` (the [`NativeSession`] trait, the simulated engine and its
//! swarm directory), `adapter.rs` (typed wrapper owning handles), `command.rs`
//! (the thread that owns a started session), `alert.rs`
//! (raw alerts and payloads), `metainfo.rs` (metainfo and magnet inspection),
//! `types.rs` (parameters and simulation knobs), `error.rs` (`NativeError`).

pub mod adapter;
pub mod alert;
mod command;
pub mod error;
pub mod metainfo;
/// Session abstraction and the in-process implementation.
pub mod session;
pub mod types;

pub use adapter::NativeSessionAdapter;
pub use alert::{AlertReceiver, AlertSink, NativeAlert};
pub use error::NativeError;
pub use metainfo::{FileEntry, SourceInfo, TorrentMetadata, TrackerEntry};
pub use session::{NativeSession, SimulatedSession, SwarmDirectory};
pub use types::{AddParams, NativeHandle, RemovalOutcome, SimulationConfig};
