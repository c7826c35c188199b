//! Metainfo and magnet inspection used to derive torrent identity before admission.

use data_encoding::BASE32;
use serde::Deserialize;
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use swarmd_events::TorrentId;
use url::Url;

use crate::error::NativeError;

/// Tracker from the announce list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEntry {
    /// Announce URL.
    pub url: String,
    /// Announce tier.
    pub tier: u32,
}

/// File described by the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path inside the save directory, `/`-separated.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Piece and file layout of a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// Name from the info dictionary.
    pub name: String,
    /// Nominal piece length in bytes.
    pub piece_length: u64,
    /// Number of pieces.
    pub piece_count: u32,
    /// Total payload size in bytes.
    pub total_bytes: u64,
    /// Files in payload order.
    pub files: Vec<FileEntry>,
}

impl TorrentMetadata {
    /// Size of the piece at `index`; the last piece may be short.
    #[must_use]
    pub fn piece_size(&self, index: u32) -> u64 {
        let start = u64::from(index) * self.piece_length;
        self.total_bytes
            .saturating_sub(start)
            .min(self.piece_length)
    }

    /// Inclusive range of pieces overlapping file `file_index`, or `None` for empty files.
    #[must_use]
    pub fn file_pieces(&self, file_index: usize) -> Option<(u32, u32)> {
        let offset: u64 = self
            .files
            .iter()
            .take(file_index)
            .map(|file| file.size_bytes)
            .sum();
        let file = self.files.get(file_index)?;
        if file.size_bytes == 0 || self.piece_length == 0 {
            return None;
        }
        let first = offset / self.piece_length;
        let last = (offset + file.size_bytes - 1) / self.piece_length;
        Some((
            u32::try_from(first).unwrap_or(u32::MAX),
            u32::try_from(last).unwrap_or(u32::MAX),
        ))
    }
}

/// Identity and layout derived from a torrent source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Info-hash derived identifier.
    pub id: TorrentId,
    /// Display name (metadata name or magnet `dn`).
    pub name: Option<String>,
    /// Ordered announce list.
    pub trackers: Vec<TrackerEntry>,
    /// Layout when the source carries metadata.
    pub metadata: Option<TorrentMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawMetainfo {
    info: RawInfo,
    #[serde(default)]
    announce: Option<String>,
    #[serde(rename = "announce-list", default)]
    announce_list: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(rename = "piece length")]
    piece_length: i64,
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
    #[serde(default)]
    length: Option<i64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    length: i64,
    path: Vec<String>,
}

const fn malformed(reason: &'static str) -> NativeError {
    NativeError::MalformedMetadata { reason }
}

/// Decode a bencoded `.torrent` payload.
///
/// # Errors
///
/// Returns [`NativeError::MalformedMetadata`] when the payload is not a valid
/// single- or multi-file metainfo dictionary.
pub fn parse_metainfo(bytes: &[u8]) -> Result<SourceInfo, NativeError> {
    let id = info_hash(bytes)?;
    let raw: RawMetainfo =
        serde_bencode::from_bytes(bytes).map_err(|_| malformed("metainfo is not a valid torrent dictionary"))?;
    let metadata = build_metadata(raw.info)?;

    let mut trackers = Vec::new();
    if let Some(tiers) = raw.announce_list {
        for (tier, urls) in tiers.into_iter().enumerate() {
            for url in urls {
                push_tracker(&mut trackers, url, u32::try_from(tier).unwrap_or(u32::MAX));
            }
        }
    }
    if trackers.is_empty()
        && let Some(url) = raw.announce
    {
        push_tracker(&mut trackers, url, 0);
    }

    Ok(SourceInfo {
        id,
        name: Some(metadata.name.clone()),
        trackers,
        metadata: Some(metadata),
    })
}

fn info_hash(bytes: &[u8]) -> Result<TorrentId, NativeError> {
    let root: Value = serde_bencode::from_bytes(bytes).map_err(|_| malformed("payload is not bencoded"))?;
    let Value::Dict(entries) = root else {
        return Err(malformed("metainfo root must be a dictionary"));
    };
    let info = entries
        .get(&b"info"[..])
        .ok_or_else(|| malformed("metainfo has no info dictionary"))?;
    let encoded = serde_bencode::to_bytes(info).map_err(|_| malformed("info dictionary cannot be re-encoded"))?;
    Ok(TorrentId::from_info_hash(&Sha1::digest(&encoded)))
}

fn build_metadata(info: RawInfo) -> Result<TorrentMetadata, NativeError> {
    if info.name.trim().is_empty() {
        return Err(malformed("torrent name is empty"));
    }
    let piece_length =
        u64::try_from(info.piece_length).map_err(|_| malformed("piece length is negative"))?;
    if piece_length == 0 {
        return Err(malformed("piece length is zero"));
    }
    if info.pieces.is_empty() || info.pieces.len() % 20 != 0 {
        return Err(malformed("piece hashes are not a multiple of 20 bytes"));
    }
    let piece_count = u32::try_from(info.pieces.len() / 20)
        .map_err(|_| malformed("too many pieces"))?;

    let files = match (info.files, info.length) {
        (Some(files), _) => files
            .into_iter()
            .map(|file| {
                let size_bytes = u64::try_from(file.length)
                    .map_err(|_| malformed("file length is negative"))?;
                let relative = join_path(&file.path)?;
                Ok(FileEntry {
                    path: format!("{}/{relative}", info.name),
                    size_bytes,
                })
            })
            .collect::<Result<Vec<_>, NativeError>>()?,
        (None, Some(length)) => vec![FileEntry {
            path: sanitise_component(&info.name)?.to_string(),
            size_bytes: u64::try_from(length).map_err(|_| malformed("file length is negative"))?,
        }],
        (None, None) => return Err(malformed("info has neither length nor files")),
    };
    if files.is_empty() {
        return Err(malformed("multi-file torrent lists no files"));
    }

    let total_bytes: u64 = files.iter().map(|file| file.size_bytes).sum();
    if total_bytes.div_ceil(piece_length) != u64::from(piece_count) {
        return Err(malformed("piece count does not match payload size"));
    }

    Ok(TorrentMetadata {
        name: info.name,
        piece_length,
        piece_count,
        total_bytes,
        files,
    })
}

fn join_path(components: &[String]) -> Result<String, NativeError> {
    if components.is_empty() {
        return Err(malformed("file path is empty"));
    }
    let parts = components
        .iter()
        .map(|part| sanitise_component(part))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("/"))
}

fn sanitise_component(part: &str) -> Result<&str, NativeError> {
    if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
        return Err(malformed("file path escapes the payload directory"));
    }
    Ok(part)
}

fn push_tracker(trackers: &mut Vec<TrackerEntry>, url: String, tier: u32) {
    let url = url.trim().to_string();
    if url.is_empty() || trackers.iter().any(|existing| existing.url == url) {
        return;
    }
    trackers.push(TrackerEntry { url, tier });
}

const fn invalid_magnet(reason: &'static str) -> NativeError {
    NativeError::InvalidMagnet { reason }
}

/// Interpret a magnet URI (`xt`, `dn` and `tr` parameters).
///
/// Accepts v1 `urn:btih:` topics in hex or base32 and v2 `urn:btmh:1220` topics.
///
/// # Errors
///
/// Returns [`NativeError::InvalidMagnet`] when the URI is malformed or carries
/// no usable info hash.
pub fn parse_magnet(uri: &str) -> Result<SourceInfo, NativeError> {
    let parsed = Url::parse(uri.trim()).map_err(|_| invalid_magnet("magnet is not a valid uri"))?;
    if parsed.scheme() != "magnet" {
        return Err(invalid_magnet("uri scheme must be magnet"));
    }

    let mut id = None;
    let mut name = None;
    let mut trackers = Vec::new();
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "xt" if id.is_none() => id = parse_topic(&value)?,
            "dn" if !value.trim().is_empty() => name = Some(value.trim().to_string()),
            "tr" => {
                let tier = u32::try_from(trackers.len()).unwrap_or(u32::MAX);
                push_tracker(&mut trackers, value.into_owned(), tier);
            }
            _ => {}
        }
    }

    let id = id.ok_or_else(|| invalid_magnet("magnet has no supported exact topic"))?;
    Ok(SourceInfo {
        id,
        name,
        trackers,
        metadata: None,
    })
}

fn parse_topic(topic: &str) -> Result<Option<TorrentId>, NativeError> {
    if let Some(hash) = topic.strip_prefix("urn:btih:") {
        let bytes = match hash.len() {
            40 => hex::decode(hash).map_err(|_| invalid_magnet("btih is not hexadecimal"))?,
            32 => BASE32
                .decode(hash.to_ascii_uppercase().as_bytes())
                .map_err(|_| invalid_magnet("btih is not base32"))?,
            _ => return Err(invalid_magnet("btih has an unexpected length")),
        };
        return Ok(Some(TorrentId::from_info_hash(&bytes)));
    }
    if let Some(multihash) = topic.strip_prefix("urn:btmh:") {
        let digest = multihash
            .strip_prefix("1220")
            .ok_or_else(|| invalid_magnet("btmh must be a sha2-256 multihash"))?;
        let id = TorrentId::parse(digest).map_err(|_| invalid_magnet("btmh digest is malformed"))?;
        return Ok(Some(id));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmd_test_support::fixtures::{MetainfoBuilder, magnet_uri};

    #[test]
    fn single_file_metainfo_yields_layout_and_trackers() {
        let fixture = MetainfoBuilder::new("ubuntu.iso")
            .piece_length(16)
            .file("ubuntu.iso", 40)
            .tracker("http://tracker.example/announce")
            .tracker("udp://tracker.example:6969")
            .build();
        let info = parse_metainfo(&fixture.bytes).expect("parse");
        assert_eq!(info.id.as_str(), fixture.info_hash_hex);
        assert_eq!(info.name.as_deref(), Some("ubuntu.iso"));
        assert_eq!(info.trackers.len(), 2);
        let metadata = info.metadata.expect("metadata");
        assert_eq!(metadata.piece_count, 3);
        assert_eq!(metadata.total_bytes, 40);
        assert_eq!(metadata.piece_size(2), 8);
        assert_eq!(metadata.files[0].path, "ubuntu.iso");
    }

    #[test]
    fn multi_file_paths_are_prefixed_with_name() {
        let fixture = MetainfoBuilder::new("album")
            .piece_length(10)
            .file("a.flac", 15)
            .file("b.flac", 0)
            .file("c.flac", 5)
            .build();
        let metadata = parse_metainfo(&fixture.bytes)
            .expect("parse")
            .metadata
            .expect("metadata");
        assert_eq!(metadata.files[0].path, "album/a.flac");
        assert_eq!(metadata.file_pieces(0), Some((0, 1)));
        assert_eq!(metadata.file_pieces(1), None);
        assert_eq!(metadata.file_pieces(2), Some((1, 1)));
    }

    #[test]
    fn garbage_is_rejected_as_malformed() {
        let err = parse_metainfo(b"not bencode").expect_err("must fail");
        assert!(matches!(err, NativeError::MalformedMetadata { .. }));
        let err = parse_metainfo(b"d4:infoi3ee").expect_err("info must be a dict");
        assert!(matches!(err, NativeError::MalformedMetadata { .. }));
    }

    #[test]
    fn magnet_with_hex_topic_and_trackers() {
        let fixture = MetainfoBuilder::new("demo").file("demo", 4).build();
        let uri = magnet_uri(&fixture.info_hash_hex, Some("demo name"), &["udp://t.example:1337"]);
        let info = parse_magnet(&uri).expect("parse");
        assert_eq!(info.id.as_str(), fixture.info_hash_hex);
        assert_eq!(info.name.as_deref(), Some("demo name"));
        assert_eq!(info.trackers[0].url, "udp://t.example:1337");
        assert!(info.metadata.is_none());
    }

    #[test]
    fn magnet_base32_topic_matches_hex() {
        let info = parse_magnet("magnet:?xt=urn:btih:AAAQEAYEAUDAOCAJBIFQYDIOB4IBCEQT")
            .expect("parse");
        assert_eq!(info.id.as_str(), "000102030405060708090a0b0c0d0e0f10111213");

        let lower = parse_magnet("magnet:?xt=urn:btih:aaaqeayeaudaocajbifqydiob4ibceqt")
            .expect("lowercase base32");
        assert_eq!(lower.id, info.id);
        assert!(parse_magnet(&format!("magnet:?xt=urn:btih:{}", "0".repeat(32))).is_err());
    }

    #[test]
    fn magnet_errors_are_typed() {
        for uri in [
            "http://example.com",
            "magnet:?dn=nothing",
            "magnet:?xt=urn:btih:1234",
            "not a uri",
        ] {
            assert!(
                matches!(parse_magnet(uri), Err(NativeError::InvalidMagnet { .. })),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn magnet_v2_topic_yields_long_id() {
        let digest = "ab".repeat(32);
        let info = parse_magnet(&format!("magnet:?xt=urn:btmh:1220{digest}")).expect("parse");
        assert_eq!(info.id.as_str().len(), 64);
    }
}
