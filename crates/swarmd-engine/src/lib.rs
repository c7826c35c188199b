#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Torrent session manager: event aggregation, registry, state observation
//! and the engine facade on top of a native session.
//!
//! Layout: `registry.rs` (authoritative per-torrent state), `aggregator.rs`
//! (alert → event classification), `provider.rs` (observation feeds),
//! `engine.rs` (`TorrentEngine` facade), `repository.rs` (metadata stores),
//! `waiters.rs` (synchronous add completion).

mod aggregator;
pub mod engine;
pub mod provider;
pub mod registry;
pub mod repository;
mod waiters;

pub use engine::{AddFailure, EngineOptions, TorrentEngine};
pub use provider::{StateProvider, Subscription, SubscriptionClosed};
pub use registry::{Applied, TorrentRegistry, TorrentSnapshot};
pub use repository::{JsonTorrentStore, MemoryTorrentRepository};
