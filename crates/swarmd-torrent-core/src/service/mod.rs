//! Collaborator traits implemented outside the engine.

use crate::model::Torrent;
use async_trait::async_trait;
use swarmd_events::TorrentId;

/// Narrow persistence interface for torrent records.
///
/// Failures are reported to the caller, which logs and counts them; the
/// engine never aborts a lifecycle operation because persistence failed.
#[async_trait]
pub trait TorrentRepository: Send + Sync {
    /// Insert or replace the stored record for a torrent.
    async fn save_torrent_metadata(&self, torrent: &Torrent) -> anyhow::Result<()>;

    /// Delete the stored record for a torrent. Deleting a missing record succeeds.
    async fn delete_torrent_metadata(&self, id: &TorrentId) -> anyhow::Result<()>;

    /// Load every stored record.
    async fn load_all(&self) -> anyhow::Result<Vec<Torrent>>;

    /// Load a single record; default implementation scans [`Self::load_all`].
    async fn load(&self, id: &TorrentId) -> anyhow::Result<Option<Torrent>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|torrent| &torrent.id == id))
    }
}
