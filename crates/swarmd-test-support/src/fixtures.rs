//! Test fixtures: bencoded metainfo payloads, magnet links and scratch directories.

use serde::Serialize;
use sha1::{Digest, Sha1};
use tempfile::TempDir;

const DEFAULT_PIECE_LENGTH: u64 = 16;

#[derive(Serialize)]
struct FixtureMetainfo {
    info: FixtureInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    announce: Option<String>,
    #[serde(rename = "announce-list", skip_serializing_if = "Option::is_none")]
    announce_list: Option<Vec<Vec<String>>>,
}

#[derive(Serialize)]
struct FixtureInfo {
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u64,
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<FixtureFile>>,
}

#[derive(Serialize)]
struct FixtureFile {
    length: u64,
    path: Vec<String>,
}

/// Built metainfo payload together with the values tests assert against.
#[derive(Debug, Clone)]
pub struct MetainfoFixture {
    /// Bencoded `.torrent` bytes.
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-1 of the info dictionary.
    pub info_hash_hex: String,
    /// Torrent name.
    pub name: String,
    /// Number of pieces.
    pub piece_count: u32,
    /// Total payload size.
    pub total_bytes: u64,
}

/// Builder for small, valid metainfo payloads.
///
/// One file produces a single-file torrent named after the builder; more
/// files produce a multi-file torrent rooted at the name.
#[derive(Debug, Clone)]
pub struct MetainfoBuilder {
    name: String,
    piece_length: u64,
    files: Vec<(String, u64)>,
    trackers: Vec<String>,
}

impl MetainfoBuilder {
    /// Start a builder for a torrent called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            piece_length: DEFAULT_PIECE_LENGTH,
            files: Vec::new(),
            trackers: Vec::new(),
        }
    }

    /// Override the piece length (default 16 bytes).
    #[must_use]
    pub const fn piece_length(mut self, piece_length: u64) -> Self {
        self.piece_length = piece_length;
        self
    }

    /// Append a file (path relative to the torrent root for multi-file torrents).
    #[must_use]
    pub fn file(mut self, path: impl Into<String>, size_bytes: u64) -> Self {
        self.files.push((path.into(), size_bytes));
        self
    }

    /// Append a tracker, each in its own tier.
    #[must_use]
    pub fn tracker(mut self, url: impl Into<String>) -> Self {
        self.trackers.push(url.into());
        self
    }

    /// Encode the payload.
    ///
    /// # Panics
    ///
    /// Panics if bencoding fails, which only happens for builder misuse.
    #[must_use]
    pub fn build(self) -> MetainfoFixture {
        let total_bytes: u64 = self.files.iter().map(|(_, size)| size).sum();
        let piece_count = total_bytes.div_ceil(self.piece_length.max(1));
        let pieces = (0..piece_count)
            .flat_map(|index| Sha1::digest(index.to_be_bytes()).to_vec())
            .collect();

        let (length, files) = if self.files.len() == 1 {
            (Some(total_bytes), None)
        } else {
            let files = self
                .files
                .iter()
                .map(|(path, size)| FixtureFile {
                    length: *size,
                    path: path.split('/').map(str::to_string).collect(),
                })
                .collect();
            (None, Some(files))
        };

        let info = FixtureInfo {
            name: self.name.clone(),
            piece_length: self.piece_length,
            pieces,
            length,
            files,
        };
        let info_bytes = serde_bencode::to_bytes(&info).expect("fixture info encodes");
        let info_hash_hex = hex::encode(Sha1::digest(&info_bytes));

        let announce_list = (self.trackers.len() > 1).then(|| {
            self.trackers
                .iter()
                .map(|tracker| vec![tracker.clone()])
                .collect()
        });
        let metainfo = FixtureMetainfo {
            info,
            announce: self.trackers.first().cloned(),
            announce_list,
        };
        MetainfoFixture {
            bytes: serde_bencode::to_bytes(&metainfo).expect("fixture metainfo encodes"),
            info_hash_hex,
            name: self.name,
            piece_count: u32::try_from(piece_count).expect("fixture piece count fits u32"),
            total_bytes,
        }
    }
}

/// Build a magnet URI for an info hash with optional display name and trackers.
#[must_use]
pub fn magnet_uri(info_hash_hex: &str, name: Option<&str>, trackers: &[&str]) -> String {
    let mut uri = format!("magnet:?xt=urn:btih:{info_hash_hex}");
    if let Some(name) = name {
        uri.push_str("&dn=");
        uri.extend(url::form_urlencoded::byte_serialize(name.as_bytes()));
    }
    for tracker in trackers {
        uri.push_str("&tr=");
        uri.extend(url::form_urlencoded::byte_serialize(tracker.as_bytes()));
    }
    uri
}

/// Fresh scratch directory removed on drop.
///
/// # Panics
///
/// Panics if the OS temporary directory is unusable.
#[must_use]
pub fn scratch_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("swarmd-test-")
        .tempdir()
        .expect("temporary directory available")
}
