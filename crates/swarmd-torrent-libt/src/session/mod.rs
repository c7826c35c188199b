//! Native session seam and its in-process implementation.

use anyhow::Result;
use swarmd_torrent_core::FilePriority;

use crate::alert::AlertSink;
use crate::types::{AddParams, NativeHandle, RemovalOutcome};

mod simulated;
mod swarm;

pub use simulated::SimulatedSession;
pub use swarm::SwarmDirectory;

/// Operations every embedded protocol engine provides.
///
/// Calls are synchronous from the caller's point of view; implementations
/// run their protocol work on their own thread and report through the sink
/// registered in [`NativeSession::start`]. Alerts must be pushed in the
/// order they happen.
pub trait NativeSession: Send {
    /// Start the session and register the single alert sink.
    fn start(&mut self, sink: AlertSink) -> Result<()>;

    /// Admit a torrent and return its handle.
    fn add_torrent(&mut self, params: &AddParams) -> Result<NativeHandle>;

    /// Remove a torrent, optionally deleting its payload.
    fn remove_torrent(&mut self, handle: NativeHandle, with_data: bool) -> Result<RemovalOutcome>;

    /// Pause protocol activity for a torrent.
    fn pause(&mut self, handle: NativeHandle) -> Result<()>;

    /// Resume protocol activity for a torrent.
    fn resume(&mut self, handle: NativeHandle) -> Result<()>;

    /// Replace per-file priorities.
    fn set_priorities(&mut self, handle: NativeHandle, priorities: &[FilePriority]) -> Result<()>;

    /// Read the verified-piece bitmap; empty until metadata is known.
    fn query_pieces(&self, handle: NativeHandle) -> Result<Vec<bool>>;

    /// Whether the session is accepting work.
    fn is_running(&self) -> bool;

    /// Stop the session worker. Idempotent.
    fn shutdown(&mut self) -> Result<()>;
}
