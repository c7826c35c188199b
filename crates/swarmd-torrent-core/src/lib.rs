#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Engine-agnostic torrent domain types, error taxonomy and the repository seam.
//!
//! Layout: `model/` (torrent record, snapshots, piece bitmap), `error.rs`
//! (`TorrentError`), `service/` (collaborator traits).

pub mod error;
pub mod model;
pub mod service;

pub use error::{TorrentError, TorrentResult};
pub use model::{
    AddMode, AddTorrent, AddTorrentOptions, AdvancedState, BasicState, DataDeletionFailure,
    DeleteReport, FilePriority, PeerState, PieceBitmap, SessionState, Torrent, TorrentSource,
    TrackerState,
};
pub use service::TorrentRepository;
pub use swarmd_events::{TorrentId, TorrentStateCode};
