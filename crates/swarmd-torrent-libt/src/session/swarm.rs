use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use swarmd_events::TorrentId;

use crate::error::NativeError;
use crate::metainfo::{TorrentMetadata, parse_metainfo};

/// Content reachable through the simulated swarm.
///
/// Magnet links resolve only for torrents published here; anything else
/// stays in `downloading_metadata` forever.
#[derive(Clone, Default)]
pub struct SwarmDirectory {
    published: Arc<RwLock<HashMap<TorrentId, TorrentMetadata>>>,
}

impl SwarmDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the torrent described by `bytes` available to magnet links.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::MalformedMetadata`] when `bytes` is not a valid metainfo payload.
    pub fn publish_metainfo(&self, bytes: &[u8]) -> Result<TorrentId, NativeError> {
        let info = parse_metainfo(bytes)?;
        let metadata = info
            .metadata
            .ok_or(NativeError::MalformedMetadata {
                reason: "metainfo carries no layout",
            })?;
        self.publish(info.id.clone(), metadata);
        Ok(info.id)
    }

    /// Publish a parsed layout.
    pub fn publish(&self, id: TorrentId, metadata: TorrentMetadata) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, metadata);
    }

    /// Look up published metadata.
    #[must_use]
    pub fn lookup(&self, id: &TorrentId) -> Option<TorrentMetadata> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}
