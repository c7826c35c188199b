//! Identifier parsing error primitives.

use std::fmt::{self, Display, Formatter};

/// Error emitted when a torrent identifier is not a valid info hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidTorrentId {
    /// The value has neither the v1 (40) nor the v2 (64) hex length.
    Length {
        /// Observed length in characters.
        len: usize,
    },
    /// The value contains characters outside the hex alphabet.
    NotHex,
}

impl InvalidTorrentId {
    /// Static reason string suitable for structured logs and validation errors.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Length { .. } => "info hash must be 40 or 64 hex characters",
            Self::NotHex => "info hash must be hexadecimal",
        }
    }
}

impl Display for InvalidTorrentId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("invalid torrent identifier")
    }
}

impl std::error::Error for InvalidTorrentId {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_id_exposes_reason() {
        let err = InvalidTorrentId::Length { len: 3 };
        assert_eq!(err.to_string(), "invalid torrent identifier");
        assert!(err.reason().contains("40 or 64"));
        assert!(InvalidTorrentId::NotHex.reason().contains("hexadecimal"));
    }
}
