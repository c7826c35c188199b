//! Torrent metadata stores used for restart restoration.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use swarmd_torrent_core::{Torrent, TorrentId, TorrentRepository};
use tokio::fs;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";

/// One JSON file per torrent under a metadata directory.
///
/// Writes go through a temporary file and a rename so a crash never leaves a
/// half-written record behind.
#[derive(Debug, Clone)]
pub struct JsonTorrentStore {
    dir: PathBuf,
}

impl JsonTorrentStore {
    /// Open (and create if needed) the metadata directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create metadata dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &TorrentId) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXTENSION}", id.as_str()))
    }
}

#[async_trait]
impl TorrentRepository for JsonTorrentStore {
    async fn save_torrent_metadata(&self, torrent: &Torrent) -> anyhow::Result<()> {
        let path = self.record_path(&torrent.id);
        let staging = path.with_extension("tmp");
        let body = serde_json::to_vec_pretty(torrent).context("failed to encode torrent record")?;
        fs::write(&staging, &body)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &path)
            .await
            .with_context(|| format!("failed to move record into {}", path.display()))?;
        debug!(torrent_id = %torrent.id, path = %path.display(), "torrent record saved");
        Ok(())
    }

    async fn delete_torrent_metadata(&self, id: &TorrentId) -> anyhow::Result<()> {
        let path = self.record_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", path.display()))
            }
        }
    }

    async fn load_all(&self) -> anyhow::Result<Vec<Torrent>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read {}", self.dir.display()))?;
        let mut torrents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unreadable torrent record skipped");
                    continue;
                }
            };
            match serde_json::from_slice::<Torrent>(&bytes) {
                Ok(torrent) => torrents.push(torrent),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed torrent record skipped");
                }
            }
        }
        torrents.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
        Ok(torrents)
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTorrentRepository {
    records: Mutex<HashMap<TorrentId, Torrent>>,
}

impl MemoryTorrentRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `torrents`.
    #[must_use]
    pub fn with_records(torrents: impl IntoIterator<Item = Torrent>) -> Self {
        let records = torrents
            .into_iter()
            .map(|torrent| (torrent.id.clone(), torrent))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TorrentRepository for MemoryTorrentRepository {
    async fn save_torrent_metadata(&self, torrent: &Torrent) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(torrent.id.clone(), torrent.clone());
        Ok(())
    }

    async fn delete_torrent_metadata(&self, id: &TorrentId) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    async fn load_all(&self) -> anyhow::Result<Vec<Torrent>> {
        let mut torrents: Vec<Torrent> = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        torrents.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
        Ok(torrents)
    }

    async fn load(&self, id: &TorrentId) -> anyhow::Result<Option<Torrent>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }
}
